use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::PackageReport;

/// Name of the summary written into the license folder.
pub const LICENSES_JSON: &str = "licenses.json";

/// Write `licenses.json` into `license_root` and return its path.
pub fn write_licenses_json(license_root: &Path, reports: &[PackageReport]) -> Result<PathBuf> {
    std::fs::create_dir_all(license_root)
        .with_context(|| format!("creating {}", license_root.display()))?;

    let path = license_root.join(LICENSES_JSON);
    let json = serde_json::to_string_pretty(reports)?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;

    Ok(path)
}

/// Print the reports as pretty JSON on stdout.
pub fn render(reports: &[PackageReport]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(reports)?);
    Ok(())
}
