use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::catalog::Catalog;
use crate::error::ResolveError;
use crate::license::artifact::LicenseArtifact;

#[derive(Debug, Default)]
struct RegistryTable {
    by_path: HashMap<PathBuf, Arc<LicenseArtifact>>,
    /// SPDX identifiers handed in by callers, and the one path each may live at.
    promoted: HashMap<String, PathBuf>,
}

/// Process-wide table of license artifacts keyed by absolute destination path.
///
/// Lookup and creation happen under a short, non-suspending lock; the slow
/// part (disk, network) runs afterwards behind each artifact's own gate.
#[derive(Debug)]
pub struct LicenseRegistry {
    catalog: Arc<Catalog>,
    table: Mutex<RegistryTable>,
}

impl LicenseRegistry {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        LicenseRegistry {
            catalog,
            table: Mutex::new(RegistryTable::default()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Resolve the license text that belongs at `dest`.
    ///
    /// Concurrent calls for the same path share one artifact and one run of
    /// `produce`. A `spdx_id` found in the catalog promotes that entry to
    /// `dest`: its canonical text is written there without calling `produce`.
    pub async fn resolve<F, Fut>(
        &self,
        dest: &Path,
        url: Option<Url>,
        spdx_id: Option<&str>,
        produce: F,
    ) -> Result<Arc<LicenseArtifact>, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ResolveError>>,
    {
        let path = std::path::absolute(dest).map_err(|e| ResolveError::io(dest, e))?;
        let artifact = self.find_or_create(path, url, spdx_id)?;

        artifact.initialize(&self.catalog, produce).await?;

        Ok(artifact)
    }

    fn find_or_create(
        &self,
        path: PathBuf,
        url: Option<Url>,
        spdx_id: Option<&str>,
    ) -> Result<Arc<LicenseArtifact>, ResolveError> {
        let mut table = self.table.lock();

        if let Some(existing) = table.by_path.get(&path) {
            return Ok(Arc::clone(existing));
        }

        let known = match spdx_id {
            Some(id) => {
                let id = self
                    .catalog
                    .get(id)
                    .map_or_else(|| id.to_string(), |entry| entry.spdx_id().to_string());

                if let Some(previous) = table.promoted.get(&id) {
                    return Err(ResolveError::ContractViolation(format!(
                        "'{id}' is already resolved at {}, refusing to promote it to {}",
                        previous.display(),
                        path.display()
                    )));
                }
                table.promoted.insert(id.clone(), path.clone());
                Some(id)
            }
            None => None,
        };

        let artifact = Arc::new(LicenseArtifact::new(path.clone(), url, known));
        table.by_path.insert(path, Arc::clone(&artifact));

        Ok(artifact)
    }

    /// Whether an artifact for `dest` exists, in any state.
    pub fn contains(&self, dest: &Path) -> bool {
        std::path::absolute(dest).is_ok_and(|path| self.table.lock().by_path.contains_key(&path))
    }

    /// Snapshot of every artifact, ordered by path.
    pub fn artifacts(&self) -> Vec<Arc<LicenseArtifact>> {
        let mut all: Vec<_> = self.table.lock().by_path.values().cloned().collect();
        all.sort_by(|a, b| a.path().cmp(b.path()));
        all
    }
}
