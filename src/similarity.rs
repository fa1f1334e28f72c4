//! Shingle-based text fingerprints.
//!
//! A [`Profile`] counts every overlapping run of [`SHINGLE_LEN`] characters in
//! a whitespace-normalized text. Two profiles are compared with the cosine of
//! their count vectors, so the score is symmetric, lies in `[0, 1]` and grows
//! with the number of shared shingles.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Characters per shingle.
pub const SHINGLE_LEN: usize = 3;

/// Scores strictly above this are treated as the same license.
pub const MATCH_THRESHOLD: f64 = 0.9;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex must compile"));

/// Sparse shingle frequency map of a text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    shingles: HashMap<String, u32>,
    norm: f64,
}

impl Profile {
    pub fn new(text: &str) -> Self {
        let normalized = WHITESPACE.replace_all(text.trim(), " ");
        let chars: Vec<char> = normalized.chars().collect();

        let mut shingles: HashMap<String, u32> = HashMap::new();
        for window in chars.windows(SHINGLE_LEN) {
            *shingles.entry(window.iter().collect()).or_default() += 1;
        }

        let norm = shingles
            .values()
            .map(|&n| f64::from(n) * f64::from(n))
            .sum::<f64>()
            .sqrt();

        Profile { shingles, norm }
    }

    pub fn is_empty(&self) -> bool {
        self.shingles.is_empty()
    }

    /// Cosine similarity of the two shingle vectors. Empty profiles score `0.0`.
    pub fn similarity(&self, other: &Profile) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }

        // iterate the smaller map
        let (small, large) = if self.shingles.len() <= other.shingles.len() {
            (self, other)
        } else {
            (other, self)
        };

        let dot: f64 = small
            .shingles
            .iter()
            .filter_map(|(shingle, &n)| {
                large
                    .shingles
                    .get(shingle)
                    .map(|&m| f64::from(n) * f64::from(m))
            })
            .sum();

        (dot / (self.norm * other.norm)).clamp(0.0, 1.0)
    }
}
