use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

/// Root configuration structure, deserialized from `.license-fetchr/config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub catalog: CatalogConfig,
    pub output: OutputConfig,
    pub nuget: NugetConfig,
}

/// HTTP behavior of the fetcher and the SPDX downloader.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Issue one GET for unrecognized URLs and classify where they redirect.
    pub follow_redirects: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_secs: 10,
            user_agent: format!("license-fetchr/{}", env!("CARGO_PKG_VERSION")),
            follow_redirects: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory of `<SPDX-ID>.txt` files added to the built-in catalog.
    pub extra_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where license files are written, relative to the project directory.
    pub license_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            license_dir: PathBuf::from("licenses"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NugetConfig {
    /// Global packages folder; falls back to `NUGET_PACKAGES`, then `~/.nuget/packages`.
    pub packages_dir: Option<PathBuf>,
}

impl NugetConfig {
    pub fn resolve_packages_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.packages_dir {
            return Some(dir.clone());
        }
        if let Some(dir) = std::env::var_os("NUGET_PACKAGES").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(dir));
        }
        dirs::home_dir().map(|home| home.join(".nuget").join("packages"))
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `<project_path>/.license-fetchr/config.toml`
/// 3. `~/.config/license-fetchr/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        let content = std::fs::read_to_string(path)?;
        return Ok(toml::from_str(&content)?);
    }

    let project_config = project_path.join(".license-fetchr").join("config.toml");
    if project_config.exists() {
        let content = std::fs::read_to_string(&project_config)?;
        return Ok(toml::from_str(&content)?);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("license-fetchr")
            .join("config.toml");
        if home_config.exists() {
            let content = std::fs::read_to_string(&home_config)?;
            return Ok(toml::from_str(&content)?);
        }
    }

    Ok(Config::default())
}
