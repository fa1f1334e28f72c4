use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::catalog::{Catalog, NOASSERTION};
use crate::error::ResolveError;
use crate::license::copyright::extract_copyright;
use crate::similarity::Profile;

/// Lifecycle of a [`LicenseArtifact`].
#[derive(Debug, Clone)]
pub enum Resolution {
    Unresolved,
    Resolving,
    Resolved(Arc<LicenseDetails>),
    Failed(ResolveError),
}

impl Resolution {
    fn is_done(&self) -> bool {
        matches!(self, Resolution::Resolved(_) | Resolution::Failed(_))
    }
}

/// What is known about a license text once it is on disk.
#[derive(Debug)]
pub struct LicenseDetails {
    pub spdx_id: Option<String>,
    pub copyright: Vec<String>,
    pub profile: Profile,
    /// Similarity to the catalog text of `spdx_id`, when the catalog has one.
    pub score: Option<f64>,
}

/// A license text materialized (or being materialized) at one destination path.
///
/// Only the registry creates artifacts, and only the caller that claims the
/// artifact's gate moves it out of `Resolving`.
#[derive(Debug)]
pub struct LicenseArtifact {
    path: PathBuf,
    url: Option<Url>,
    known_spdx: Option<String>,
    state: watch::Sender<Resolution>,
}

impl LicenseArtifact {
    pub(crate) fn new(path: PathBuf, url: Option<Url>, known_spdx: Option<String>) -> Self {
        let (state, _) = watch::channel(Resolution::Unresolved);
        info!(path = %path.display(), "created license artifact");
        LicenseArtifact {
            path,
            url,
            known_spdx,
            state,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Resolved SPDX identifier, or `NOASSERTION`.
    pub fn spdx_id(&self) -> String {
        let id = match &*self.state.borrow() {
            Resolution::Resolved(details) => details.spdx_id.clone(),
            _ => self.known_spdx.clone(),
        };
        id.unwrap_or_else(|| NOASSERTION.to_string())
    }

    pub fn copyright(&self) -> Vec<String> {
        self.details()
            .map(|d| d.copyright.clone())
            .unwrap_or_default()
    }

    pub fn details(&self) -> Option<Arc<LicenseDetails>> {
        match &*self.state.borrow() {
            Resolution::Resolved(details) => Some(Arc::clone(details)),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<ResolveError> {
        match &*self.state.borrow() {
            Resolution::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.borrow(), Resolution::Resolved(_))
    }

    /// Run the one-time initializer.
    ///
    /// The first caller flips `Unresolved` to `Resolving` and does the work;
    /// everyone else waits for the published outcome and shares it. `produce`
    /// is only invoked when neither a file on disk nor the catalog supplies
    /// the text.
    pub(crate) async fn initialize<F, Fut>(
        &self,
        catalog: &Catalog,
        produce: F,
    ) -> Result<(), ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ResolveError>>,
    {
        let claimed = self.state.send_if_modified(|state| {
            if matches!(state, Resolution::Unresolved) {
                *state = Resolution::Resolving;
                true
            } else {
                false
            }
        });

        if !claimed {
            return self.wait().await;
        }

        let claim = Claim {
            artifact: self,
            published: false,
        };
        let outcome = self.load(catalog, produce).await;
        claim.publish(outcome)
    }

    async fn wait(&self) -> Result<(), ResolveError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(Resolution::is_done)
            .await
            .map_err(|_| ResolveError::Interrupted {
                path: self.path.clone(),
            })?;
        let result = match &*state {
            Resolution::Failed(err) => Err(err.clone()),
            _ => Ok(()),
        };
        result
    }

    async fn load<F, Fut>(&self, catalog: &Catalog, produce: F) -> Result<LicenseDetails, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ResolveError>>,
    {
        let text = match read_existing(&self.path).await? {
            Some(text) => {
                debug!(path = %self.path.display(), "using existing license text");
                text
            }
            None => self.materialize(catalog, produce).await?,
        };

        let profile = Profile::new(&text);

        let details = match &self.known_spdx {
            Some(id) => LicenseDetails {
                spdx_id: Some(id.clone()),
                copyright: Vec::new(),
                score: catalog.get(id).map(|entry| entry.profile().similarity(&profile)),
                profile,
            },
            None => {
                let hit = catalog
                    .identify(&profile)
                    .map(|(entry, score)| (entry.spdx_id().to_string(), score));
                if let Some((id, score)) = &hit {
                    debug!(path = %self.path.display(), spdx_id = %id, score, "identified license text");
                }
                LicenseDetails {
                    spdx_id: hit.as_ref().map(|(id, _)| id.clone()),
                    score: hit.map(|(_, score)| score),
                    copyright: extract_copyright(&text),
                    profile,
                }
            }
        };

        Ok(details)
    }

    /// Create the destination file and fill it.
    ///
    /// The exclusive create is the cross-process lock: whoever creates the
    /// file fetches, a process that finds a non-empty file uses it as is.
    async fn materialize<F, Fut>(&self, catalog: &Catalog, produce: F) -> Result<String, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ResolveError>>,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ResolveError::io(parent, e))?;
        }

        let created = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await;

        let (mut file, created) = match created {
            Ok(file) => (file, true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if let Some(text) = read_existing(&self.path).await? {
                    debug!(path = %self.path.display(), "license text written concurrently by another process");
                    return Ok(text);
                }
                // empty leftover: redo the fetch, a redundant download is harmless
                let file = OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .open(&self.path)
                    .await
                    .map_err(|e| ResolveError::io(&self.path, e))?;
                (file, false)
            }
            Err(e) => return Err(ResolveError::io(&self.path, e)),
        };

        let text = match self.obtain_text(catalog, produce).await {
            Ok(text) => text,
            Err(err) => {
                drop(file);
                if created {
                    self.release_lock().await;
                }
                return Err(err);
            }
        };

        let written = match file.write_all(text.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        drop(file);

        if let Err(e) = written {
            if created {
                if let Err(e) = fs::remove_file(&self.path).await {
                    warn!(path = %self.path.display(), error = %e, "could not remove partial license file");
                }
            }
            return Err(ResolveError::io(&self.path, e));
        }

        Ok(text)
    }

    /// Remove the lock file after a failed fetch, unless another process has
    /// taken it over and filled it in the meantime.
    async fn release_lock(&self) {
        match fs::metadata(&self.path).await {
            Ok(meta) if meta.len() == 0 => {
                if let Err(e) = fs::remove_file(&self.path).await {
                    warn!(path = %self.path.display(), error = %e, "could not remove license lock file");
                }
            }
            Ok(_) => {
                debug!(path = %self.path.display(), "keeping license text written by another process");
            }
            Err(_) => {}
        }
    }

    async fn obtain_text<F, Fut>(&self, catalog: &Catalog, produce: F) -> Result<String, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ResolveError>>,
    {
        if let Some(entry) = self.known_spdx.as_deref().and_then(|id| catalog.get(id)) {
            debug!(spdx_id = entry.spdx_id(), "using catalog license text");
            return Ok(entry.text().to_string());
        }
        produce().await
    }
}

/// Publishes the claimant's outcome exactly once, even if its future is dropped.
struct Claim<'a> {
    artifact: &'a LicenseArtifact,
    published: bool,
}

impl Claim<'_> {
    fn publish(mut self, outcome: Result<LicenseDetails, ResolveError>) -> Result<(), ResolveError> {
        self.published = true;
        match outcome {
            Ok(details) => {
                self.artifact
                    .state
                    .send_replace(Resolution::Resolved(Arc::new(details)));
                Ok(())
            }
            Err(err) => {
                error!(path = %self.artifact.path.display(), kind = err.kind(), error = %err, "init license failed");
                self.artifact
                    .state
                    .send_replace(Resolution::Failed(err.clone()));
                Err(err)
            }
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.artifact
                .state
                .send_replace(Resolution::Failed(ResolveError::Interrupted {
                    path: self.artifact.path.clone(),
                }));
        }
    }
}

async fn read_existing(path: &Path) -> Result<Option<String>, ResolveError> {
    match fs::read(path).await {
        Ok(bytes) if !bytes.is_empty() => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ResolveError::io(path, e)),
    }
}
