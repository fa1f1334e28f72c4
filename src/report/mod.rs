//! Report renderers for license resolution results.
//!
//! - [`terminal`]: colored, tabular output with summary box; respects `--verbose` / `--quiet`.
//! - [`json`]: `licenses.json` next to the license texts, and JSON on stdout.

pub mod json;
pub mod terminal;
