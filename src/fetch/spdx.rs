use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tracing::debug;

use crate::error::ResolveError;
use crate::license::{LicenseArtifact, LicenseRegistry};

/// Canonical SPDX license data, one JSON document per identifier.
pub const SPDX_DATA_URL: &str = "https://spdx.org/licenses";

/// Resolves bare SPDX identifiers to `<dest_dir>/<id>.txt`.
pub struct SpdxDownloader<'a> {
    registry: &'a LicenseRegistry,
    client: &'a Client,
}

impl<'a> SpdxDownloader<'a> {
    pub fn new(registry: &'a LicenseRegistry, client: &'a Client) -> Self {
        SpdxDownloader { registry, client }
    }

    pub async fn resolve(
        &self,
        spdx_id: &str,
        dest_dir: &Path,
    ) -> Result<Arc<LicenseArtifact>, ResolveError> {
        let catalog = self.registry.catalog();
        let spdx_id = catalog.get(spdx_id).map_or(spdx_id, |entry| entry.spdx_id());
        let dest = dest_dir.join(format!("{spdx_id}.txt"));
        let client = self.client;

        self.registry
            .resolve(&dest, None, Some(spdx_id), move || async move {
                if let Some(entry) = catalog.get(spdx_id) {
                    return Ok(entry.text().to_string());
                }
                fetch_license_text(client, spdx_id).await
            })
            .await
    }
}

/// Fetch the license (or exception) text for `spdx_id` from spdx.org.
pub async fn fetch_license_text(client: &Client, spdx_id: &str) -> Result<String, ResolveError> {
    let url = format!("{SPDX_DATA_URL}/{spdx_id}.json");
    debug!(%url, "fetching SPDX license data");

    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| ResolveError::transport(&url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ResolveError::transport(&url, format!("HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ResolveError::transport(&url, e))?;

    license_text_from_json(&body).ok_or_else(|| ResolveError::MissingLicenseText {
        id: spdx_id.to_string(),
    })
}

/// `licenseText`, or `licenseExceptionText` for exceptions; blank counts as missing.
fn license_text_from_json(body: &str) -> Option<String> {
    let data: serde_json::Value = serde_json::from_str(body).ok()?;
    ["licenseText", "licenseExceptionText"]
        .iter()
        .find_map(|field| data.get(field).and_then(|t| t.as_str()))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn test_license_text_field() {
        let json = r#"{"licenseId":"Zlib","licenseText":"zlib License\n..."}"#;
        assert_eq!(license_text_from_json(json).unwrap(), "zlib License\n...");
    }

    #[test]
    fn test_exception_text_field() {
        let json = r#"{"licenseExceptionId":"LLVM-exception","licenseExceptionText":"---- LLVM Exceptions ----"}"#;
        assert_eq!(
            license_text_from_json(json).unwrap(),
            "---- LLVM Exceptions ----"
        );
    }

    #[test]
    fn test_missing_or_malformed() {
        assert_eq!(license_text_from_json(r#"{"licenseText": ""}"#), None);
        assert_eq!(license_text_from_json(r#"{"licenseText": 42}"#), None);
        assert_eq!(license_text_from_json("<html>not json</html>"), None);
    }

    #[tokio::test]
    async fn test_catalog_ids_never_touch_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LicenseRegistry::new(Arc::new(Catalog::builtin()));
        let client = Client::new();
        let downloader = SpdxDownloader::new(&registry, &client);

        let artifact = downloader.resolve("Apache-2.0", dir.path()).await.unwrap();

        assert_eq!(artifact.spdx_id(), "Apache-2.0");
        assert_eq!(artifact.path(), dir.path().join("Apache-2.0.txt"));
        let written = std::fs::read_to_string(dir.path().join("Apache-2.0.txt")).unwrap();
        assert_eq!(written, include_str!("../catalog/texts/Apache-2.0.txt"));
    }

    #[tokio::test]
    async fn test_identifier_case_is_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LicenseRegistry::new(Arc::new(Catalog::builtin()));
        let client = Client::new();
        let downloader = SpdxDownloader::new(&registry, &client);

        let lower = downloader.resolve("mit", dir.path()).await.unwrap();
        let upper = downloader.resolve("MIT", dir.path()).await.unwrap();

        assert!(Arc::ptr_eq(&lower, &upper));
        assert_eq!(lower.path(), dir.path().join("MIT.txt"));
    }

    #[tokio::test]
    async fn test_existing_file_wins_over_network() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("GPL-3.0-only.txt"), "GNU GENERAL PUBLIC LICENSE").unwrap();
        let registry = LicenseRegistry::new(Arc::new(Catalog::builtin()));
        let client = Client::new();

        let artifact = SpdxDownloader::new(&registry, &client)
            .resolve("GPL-3.0-only", dir.path())
            .await
            .unwrap();

        assert!(artifact.is_resolved());
        assert_eq!(artifact.spdx_id(), "GPL-3.0-only");
    }
}
