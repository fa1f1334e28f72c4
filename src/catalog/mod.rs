//! Canonical license texts with precomputed similarity profiles.
//!
//! The built-in table covers the licenses NuGet packages ship most often. A
//! directory of `<SPDX-ID>.txt` files can extend or override it at startup.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::similarity::{Profile, MATCH_THRESHOLD};

/// SPDX sentinel for "not determined".
pub const NOASSERTION: &str = "NOASSERTION";

const BUILTIN: &[(&str, &str)] = &[
    ("MIT", include_str!("texts/MIT.txt")),
    ("Apache-2.0", include_str!("texts/Apache-2.0.txt")),
    ("BSD-3-Clause", include_str!("texts/BSD-3-Clause.txt")),
    ("BSD-2-Clause", include_str!("texts/BSD-2-Clause.txt")),
    ("ISC", include_str!("texts/ISC.txt")),
    ("MS-PL", include_str!("texts/MS-PL.txt")),
    ("Zlib", include_str!("texts/Zlib.txt")),
    ("Unlicense", include_str!("texts/Unlicense.txt")),
];

/// Immutable SPDX id / canonical text pair.
#[derive(Debug)]
pub struct CatalogEntry {
    spdx_id: String,
    text: Arc<str>,
    profile: Profile,
}

impl CatalogEntry {
    pub fn new(spdx_id: impl Into<String>, text: &str) -> Self {
        CatalogEntry {
            spdx_id: spdx_id.into(),
            text: Arc::from(text),
            profile: Profile::new(text),
        }
    }

    pub fn spdx_id(&self) -> &str {
        &self.spdx_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }
}

/// Known-license table, built once and shared read-only.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(id, text)| CatalogEntry::new(*id, text))
            .collect();
        Catalog { entries }
    }

    /// Add every `*.txt` file in `dir`; the file stem is the SPDX identifier.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("reading catalog directory {}", dir.display()))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("txt") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;

            debug!(spdx_id = id, path = %path.display(), "catalog text loaded");
            self.insert(CatalogEntry::new(id, &text));
            loaded += 1;
        }

        Ok(loaded)
    }

    /// Insert an entry, replacing any entry with the same identifier in place.
    pub fn insert(&mut self, entry: CatalogEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.spdx_id.eq_ignore_ascii_case(&entry.spdx_id))
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Look up an entry; SPDX identifiers compare case-insensitively.
    pub fn get(&self, spdx_id: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.spdx_id.eq_ignore_ascii_case(spdx_id))
    }

    /// Best entry scoring above [`MATCH_THRESHOLD`]; ties keep catalog order.
    pub fn identify(&self, profile: &Profile) -> Option<(&CatalogEntry, f64)> {
        let mut best: Option<(&CatalogEntry, f64)> = None;

        for entry in &self.entries {
            let score = entry.profile().similarity(profile);
            if score <= MATCH_THRESHOLD {
                continue;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry, score));
            }
        }

        best
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.spdx_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_identifies_every_builtin_text() {
        let catalog = Catalog::builtin();
        for (id, text) in BUILTIN {
            let (entry, score) = catalog
                .identify(&Profile::new(text))
                .unwrap_or_else(|| panic!("{id} not identified"));
            assert_eq!(entry.spdx_id(), *id);
            assert!(score >= MATCH_THRESHOLD);
        }
    }

    #[test]
    fn test_bsd_variants_pick_the_closest() {
        let catalog = Catalog::builtin();
        let bsd2 = include_str!("texts/BSD-2-Clause.txt");
        let (entry, _) = catalog.identify(&Profile::new(bsd2)).unwrap();
        assert_eq!(entry.spdx_id(), "BSD-2-Clause");
    }

    #[test]
    fn test_unknown_text_is_not_identified() {
        let catalog = Catalog::builtin();
        let text = "All rights reserved. Redistribution of this binary is prohibited \
                    without a signed agreement with Contoso Corporation.";
        assert!(catalog.identify(&Profile::new(text)).is_none());
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.get("apache-2.0").unwrap().spdx_id(), "Apache-2.0");
        assert!(catalog.get("GPL-3.0-only").is_none());
    }

    #[test]
    fn test_load_dir_adds_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("Contoso-1.0.txt")).unwrap();
        write!(f, "Contoso Source License, use only on Tuesdays.").unwrap();
        std::fs::write(dir.path().join("MIT.txt"), "custom mit").unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let mut catalog = Catalog::builtin();
        let before = catalog.len();
        assert_eq!(catalog.load_dir(dir.path()).unwrap(), 2);
        assert_eq!(catalog.len(), before + 1);
        assert_eq!(catalog.get("MIT").unwrap().text(), "custom mit");
        assert!(catalog.get("Contoso-1.0").is_some());
    }
}
