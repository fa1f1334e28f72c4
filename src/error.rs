use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Failure kinds surfaced while resolving a license artifact.
///
/// Values are cloneable so one failure can be stored on the artifact and handed
/// to every caller that waited on it.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The URL matched none of the known hosting patterns.
    #[error("unrecognized license source {url}")]
    UnrecognizedSource { url: String },

    /// Connection error or non-success HTTP status.
    #[error("download from {url} failed: {detail}")]
    Transport { url: String, detail: String },

    /// The expected HTML element was missing, or flattening produced nothing.
    #[error("lookup '{selector}' from {url} failed")]
    Extraction { url: String, selector: String },

    /// A file named by the package is not in its archive.
    #[error("file '{name}' not found in package {package}")]
    MissingPackageFile { package: String, name: String },

    /// SPDX license data came back without a usable text field.
    #[error("SPDX data for '{id}' has no license text")]
    MissingLicenseText { id: String },

    /// Programming error: a registry invariant would be broken.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The caller that claimed the artifact went away before publishing a result.
    #[error("license initialization interrupted ({})", path.display())]
    Interrupted { path: PathBuf },
}

impl ResolveError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ResolveError::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn transport(url: impl ToString, detail: impl ToString) -> Self {
        ResolveError::Transport {
            url: url.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Fatal errors abort the run; everything else is reported per package.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ResolveError::ContractViolation(_) | ResolveError::Io { .. }
        )
    }

    /// Short label used when grouping failures in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::UnrecognizedSource { .. } => "unrecognized source",
            ResolveError::Transport { .. } => "transport",
            ResolveError::Extraction { .. }
            | ResolveError::MissingPackageFile { .. }
            | ResolveError::MissingLicenseText { .. } => "extraction",
            ResolveError::ContractViolation(_) => "contract violation",
            ResolveError::Io { .. } => "io",
            ResolveError::Interrupted { .. } => "interrupted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(ResolveError::ContractViolation("x".into()).is_fatal());
        assert!(ResolveError::io("/tmp/x", std::io::Error::other("boom")).is_fatal());
        assert!(!ResolveError::UnrecognizedSource {
            url: "https://example.com".into()
        }
        .is_fatal());
        assert!(!ResolveError::transport("https://example.com", "HTTP 404").is_fatal());
    }

    #[test]
    fn test_messages_name_the_source() {
        let err = ResolveError::Extraction {
            url: "https://opensource.org/license/mit".into(),
            selector: "div#LicenseText".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("div#LicenseText"));
        assert!(msg.contains("opensource.org"));
        assert_eq!(
            ResolveError::MissingLicenseText { id: "MIT".into() }.kind(),
            "extraction"
        );
    }
}
