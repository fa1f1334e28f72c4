use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::NOASSERTION;
use crate::error::ResolveError;
use crate::license::LicenseArtifact;

/// NuGet package identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub id: String,
    pub version: String,
}

impl PackageId {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        PackageId {
            id: id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.version)
    }
}

/// How a package declares its license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseDescriptor {
    /// File inside the package archive.
    File(String),
    /// SPDX license expression.
    Expression(String),
    /// Deprecated `licenseUrl`.
    Url(Url),
}

/// A package together with its manifest license metadata.
#[derive(Debug, Clone)]
pub struct Package {
    pub identity: PackageId,
    pub license: Option<LicenseDescriptor>,
    pub authors: Option<String>,
    pub copyright: Option<String>,
    /// Extracted package folder, when the package is installed locally.
    pub package_dir: Option<PathBuf>,
}

impl Package {
    pub fn new(identity: PackageId) -> Self {
        Package {
            identity,
            license: None,
            authors: None,
            copyright: None,
            package_dir: None,
        }
    }
}

/// One license artifact as it appears in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseReport {
    pub path: PathBuf,
    pub spdx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Similarity to the catalog text of `spdx_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub copyright: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl LicenseReport {
    pub fn from_artifact(artifact: &LicenseArtifact, license_root: &Path) -> Self {
        let failure = artifact.failure();
        LicenseReport {
            path: relative_to(artifact.path(), license_root),
            spdx_id: artifact.spdx_id(),
            url: artifact.url().map(Url::to_string),
            score: artifact.details().and_then(|d| d.score),
            copyright: artifact.copyright(),
            error_kind: failure.as_ref().map(|e| e.kind().to_string()),
            error: failure.map(|e| e.to_string()),
        }
    }

    pub fn from_failure(dest: &Path, url: Option<&Url>, err: &ResolveError, license_root: &Path) -> Self {
        LicenseReport {
            path: relative_to(dest, license_root),
            spdx_id: NOASSERTION.to_string(),
            url: url.map(Url::to_string),
            score: None,
            copyright: Vec::new(),
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
        }
    }

    pub fn from_outcome(
        dest: &Path,
        url: Option<&Url>,
        outcome: &Result<Arc<LicenseArtifact>, ResolveError>,
        license_root: &Path,
    ) -> Self {
        match outcome {
            Ok(artifact) => LicenseReport::from_artifact(artifact, license_root),
            Err(err) => LicenseReport::from_failure(dest, url, err, license_root),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-package entry of `licenses.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReport {
    pub id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_expression: Option<String>,
    pub licenses: Vec<LicenseReport>,
}

impl PackageReport {
    pub fn new(package: &Package) -> Self {
        let license_expression = match &package.license {
            Some(LicenseDescriptor::Expression(expr)) => Some(expr.clone()),
            _ => None,
        };
        PackageReport {
            id: package.identity.id.clone(),
            version: package.identity.version.clone(),
            authors: package.authors.clone(),
            copyright: package.copyright.clone(),
            license_expression,
            licenses: Vec::new(),
        }
    }

    /// At least one license text and no failures.
    pub fn is_resolved(&self) -> bool {
        !self.licenses.is_empty() && self.licenses.iter().all(LicenseReport::is_resolved)
    }
}

fn relative_to(path: &Path, root: &Path) -> PathBuf {
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    path.strip_prefix(&root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}
