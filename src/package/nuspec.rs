use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;

use crate::models::LicenseDescriptor;

/// Placeholder NuGet writes into `licenseUrl` once a `license` element exists.
const DEPRECATED_LICENSE_URL: &str = "https://aka.ms/deprecateLicenseUrl";

/// License-relevant subset of a `.nuspec` manifest.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Nuspec {
    pub id: Option<String>,
    pub version: Option<String>,
    pub authors: Option<String>,
    pub copyright: Option<String>,
    pub license: Option<LicenseDescriptor>,
}

pub fn read_nuspec(path: &Path) -> Result<Nuspec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_nuspec(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Parse the `<metadata>` children of a nuspec document.
///
/// `<license type="file|expression">` takes precedence over `<licenseUrl>`.
pub fn parse_nuspec(xml: &str) -> Result<Nuspec> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut nuspec = Nuspec::default();
    let mut license: Option<(String, String)> = None;
    let mut license_url: Option<String> = None;

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut license_type = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let tag = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if tag == "license" {
                    license_type.clear();
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"type" {
                            license_type = attr.unescape_value()?.into_owned();
                        }
                    }
                }
                path.push(tag);
            }
            Event::Text(ref e) => {
                let in_metadata = path.len() >= 2 && path[path.len() - 2] == "metadata";
                let text = e.unescape()?.trim().to_string();
                if in_metadata && !text.is_empty() {
                    match path.last().map(String::as_str) {
                        Some("id") => nuspec.id = Some(text),
                        Some("version") => nuspec.version = Some(text),
                        Some("authors") => nuspec.authors = Some(text),
                        Some("copyright") => nuspec.copyright = Some(text),
                        Some("licenseUrl") => license_url = Some(text),
                        Some("license") => {
                            license = Some((license_type.to_ascii_lowercase(), text))
                        }
                        _ => {}
                    }
                }
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    nuspec.license = match license {
        Some((kind, value)) if kind == "file" => Some(LicenseDescriptor::File(value)),
        Some((kind, value)) if kind == "expression" => Some(LicenseDescriptor::Expression(value)),
        _ => license_url
            .filter(|u| u != DEPRECATED_LICENSE_URL)
            .and_then(|u| Url::parse(&u).ok())
            .map(LicenseDescriptor::Url),
    };

    Ok(nuspec)
}
