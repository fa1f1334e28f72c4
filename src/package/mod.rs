//! Package-side collaborators: discovery, manifests and archive access.
//!
//! - [`discovery`]: project, solution and lock files to package identities.
//! - [`nuspec`]: license metadata from a package manifest.
//! - [`DirectoryArchive`]: files of an extracted package folder.

pub mod discovery;
pub mod nuspec;

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

use crate::models::{Package, PackageId};

/// File names that are copied out of a package as license material.
const LICENSE_CANDIDATES: [&str; 3] = ["*license*.*", "*thirdpartynotice*.*", "*credit*.*"];

static CANDIDATES: LazyLock<GlobSet> = LazyLock::new(|| {
    let mut builder = GlobSetBuilder::new();
    for pattern in LICENSE_CANDIDATES {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("license candidate glob must compile");
        builder.add(glob);
    }
    builder.build().expect("license candidate globs must compile")
});

/// Read access to the files shipped inside a package.
pub trait PackageArchive: Send + Sync {
    /// Relative paths of every file, `/`-separated.
    fn files(&self) -> io::Result<Vec<String>>;

    /// Raw bytes of one file.
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;
}

/// An extracted package folder, as found in the NuGet global packages folder.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryArchive { root: root.into() }
    }

    fn collect(&self, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                self.collect(&path, out)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(name);
            }
        }
        Ok(())
    }
}

impl PackageArchive for DirectoryArchive {
    fn files(&self) -> io::Result<Vec<String>> {
        let mut files = Vec::new();
        self.collect(&self.root, &mut files)?;
        files.sort();
        Ok(files)
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        let relative = safe_relative(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid package path '{name}'"))
        })?;
        std::fs::read(self.root.join(relative))
    }
}

/// Whether the file name (not its folder) looks like license material.
pub fn is_license_candidate(name: &str) -> bool {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    CANDIDATES.is_match(file_name)
}

/// `name` as a relative path with only normal components, or `None`.
pub fn safe_relative(name: &str) -> Option<PathBuf> {
    let path: PathBuf = name.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
    let normal = path.components().all(|c| matches!(c, Component::Normal(_)));
    (normal && path.components().next().is_some()).then_some(path)
}

/// Extracted folder of `identity` inside the global packages folder.
pub fn locate(packages_dir: &Path, identity: &PackageId) -> Option<PathBuf> {
    let dir = packages_dir
        .join(identity.id.to_lowercase())
        .join(identity.version.to_lowercase());
    dir.is_dir().then_some(dir)
}

/// Build a [`Package`] from its installed manifest; identity only when absent.
pub fn load_package(packages_dir: Option<&Path>, identity: PackageId) -> Result<Package> {
    let Some(dir) = packages_dir.and_then(|root| locate(root, &identity)) else {
        debug!(package = %identity, "package not found in the global packages folder");
        return Ok(Package::new(identity));
    };

    let manifest = dir.join(format!("{}.nuspec", identity.id.to_lowercase()));
    let mut package = Package::new(identity);
    if manifest.exists() {
        let nuspec = nuspec::read_nuspec(&manifest)?;
        let declared = (nuspec.id.as_deref(), nuspec.version.as_deref());
        if let (Some(id), Some(version)) = declared {
            if !id.eq_ignore_ascii_case(&package.identity.id)
                || !version.eq_ignore_ascii_case(&package.identity.version)
            {
                warn!(package = %package.identity, manifest = %format!("{id}.{version}"), "manifest identity differs");
            }
        }
        package.license = nuspec.license;
        package.copyright = nuspec.copyright;
        package.authors = nuspec.authors;
    }
    package.package_dir = Some(dir);

    Ok(package)
}
