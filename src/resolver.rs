use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

use crate::error::ResolveError;
use crate::fetch::classifier::FetchContext;
use crate::fetch::spdx::SpdxDownloader;
use crate::fetch::LicenseFetcher;
use crate::license::expression::leaves;
use crate::license::{LicenseArtifact, LicenseRegistry};
use crate::models::{LicenseDescriptor, LicenseReport, Package, PackageReport};
use crate::package::{is_license_candidate, safe_relative, PackageArchive};

/// File name used for the text behind a package's legacy license URL.
pub const LICENSE_URL_FILE: &str = "license.url.txt";

/// Turns a package's license metadata into license artifacts under one root.
///
/// Layout of the root:
/// - `<id>.<version>/<path in package>`: files shipped in the package
/// - `<id>.<version>/license.url.txt`: text behind a legacy license URL
/// - `<spdx id>.txt`: one shared file per SPDX identifier
pub struct LicenseResolver {
    registry: Arc<LicenseRegistry>,
    fetcher: LicenseFetcher,
    license_root: PathBuf,
}

impl LicenseResolver {
    pub fn new(registry: Arc<LicenseRegistry>, fetcher: LicenseFetcher, license_root: PathBuf) -> Self {
        LicenseResolver {
            registry,
            fetcher,
            license_root,
        }
    }

    pub fn registry(&self) -> &LicenseRegistry {
        &self.registry
    }

    /// Resolve every license artifact of `package`.
    ///
    /// Per-artifact failures end up in the report; only fatal errors are
    /// returned.
    pub async fn resolve_package(
        &self,
        package: &Package,
        archive: Option<&dyn PackageArchive>,
    ) -> Result<PackageReport, ResolveError> {
        let mut report = PackageReport::new(package);
        let package_dir = self.license_root.join(package.identity.to_string());

        let mut embedded: Vec<String> = match archive {
            Some(archive) => match archive.files() {
                Ok(files) => files.into_iter().filter(|f| is_license_candidate(f)).collect(),
                Err(e) => {
                    warn!(package = %package.identity, error = %e, "cannot list package files");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if let Some(LicenseDescriptor::File(name)) = &package.license {
            let declared = safe_relative(name);
            let listed = embedded
                .iter()
                .any(|f| declared.is_some() && safe_relative(f) == declared);
            if !listed {
                embedded.push(name.clone());
            }
        }

        let outcomes = join_all(
            embedded
                .iter()
                .map(|name| self.resolve_embedded(package, archive, name, &package_dir)),
        )
        .await;
        for outcome in outcomes {
            report.licenses.push(outcome?);
        }

        match &package.license {
            Some(LicenseDescriptor::Expression(expr)) => {
                let downloader = SpdxDownloader::new(&self.registry, self.fetcher.client());
                let catalog = self.registry.catalog();
                let outcomes = join_all(leaves(expr).into_iter().map(|leaf| {
                    let downloader = &downloader;
                    async move {
                        let id = catalog.get(leaf.id()).map_or(leaf.id(), |e| e.spdx_id());
                        let dest = self.license_root.join(format!("{id}.txt"));
                        let outcome = downloader.resolve(id, &self.license_root).await;
                        self.report(&dest, None, outcome)
                    }
                }))
                .await;
                for outcome in outcomes {
                    report.licenses.push(outcome?);
                }
            }
            Some(LicenseDescriptor::Url(url)) => {
                let (dest, outcome) = self.resolve_url(url, package_dir.join(LICENSE_URL_FILE)).await;
                report.licenses.push(self.report(&dest, Some(url), outcome)?);
            }
            Some(LicenseDescriptor::File(_)) | None => {}
        }

        let failed = report.licenses.iter().filter(|l| !l.is_resolved()).count();
        if report.licenses.is_empty() {
            warn!(package = %package.identity, "package declares no license");
        } else if failed > 0 {
            warn!(package = %package.identity, failed, "package has unresolved licenses");
        }

        Ok(report)
    }

    /// Copy one file out of the package archive.
    async fn resolve_embedded(
        &self,
        package: &Package,
        archive: Option<&dyn PackageArchive>,
        name: &str,
        package_dir: &Path,
    ) -> Result<LicenseReport, ResolveError> {
        let missing = || ResolveError::MissingPackageFile {
            package: package.identity.to_string(),
            name: name.to_string(),
        };

        let Some(relative) = safe_relative(name) else {
            let dest = package_dir.join(name.replace(['/', '\\'], "_"));
            return self.report(&dest, None, Err(missing()));
        };
        let dest = package_dir.join(relative);

        let outcome = self
            .registry
            .resolve(&dest, None, None, move || async move {
                let archive = archive.ok_or_else(missing)?;
                let bytes = archive.read(name).map_err(|e| {
                    debug!(package = %package.identity, file = name, error = %e, "read failed");
                    missing()
                })?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            })
            .await;

        self.report(&dest, None, outcome)
    }

    /// Fetch the text behind a legacy license URL.
    ///
    /// The URL rules may move the destination out of the package folder into
    /// a file shared by every package pointing at the same license page; the
    /// final destination is returned with the outcome. Redirects are only
    /// followed when neither the registry nor the disk already has that file.
    async fn resolve_url(
        &self,
        url: &Url,
        dest: PathBuf,
    ) -> (PathBuf, Result<Arc<LicenseArtifact>, ResolveError>) {
        let mut ctx = FetchContext::new(dest, self.license_root.clone());
        let plan = self.fetcher.classify(url, &mut ctx);

        let cached = self.registry.contains(&ctx.dest)
            || fs::metadata(&ctx.dest).await.is_ok_and(|m| m.len() > 0);
        let plan = if cached {
            debug!(%url, dest = %ctx.dest.display(), "license url already resolved");
            plan
        } else {
            self.fetcher.follow_redirect(plan, &mut ctx).await
        };

        let fetcher = &self.fetcher;
        let outcome = self
            .registry
            .resolve(&ctx.dest, Some(url.clone()), None, move || fetcher.fetch(plan))
            .await;
        (ctx.dest, outcome)
    }

    /// Report entry for one outcome; fatal errors are passed through instead.
    fn report(
        &self,
        dest: &Path,
        url: Option<&Url>,
        outcome: Result<Arc<LicenseArtifact>, ResolveError>,
    ) -> Result<LicenseReport, ResolveError> {
        match outcome {
            Err(err) if err.is_fatal() => Err(err),
            outcome => Ok(LicenseReport::from_outcome(dest, url, &outcome, &self.license_root)),
        }
    }
}
