//! Engine configuration.
//!
//! Every corpus-specific constant (boilerplate phrases, the opening formula
//! and the divisions that never carry it) lives here so the engine can be
//! pointed at a different corpus without code changes. All sections default
//! to the values used for the Quran corpus and can be overridden from a JSON
//! file; missing keys fall back to the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Formulaic-match exclusion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// Phrases whose exact repetition is not reported as a near-duplicate
    pub boilerplate_phrases: Vec<String>,
    /// Variants of the opening formula carried by the first verse of a division
    pub opening_phrases: Vec<String>,
    /// Major divisions that never open with the formula
    pub opening_exempt_majors: Vec<u32>,
    /// Scores at or above this are near-duplicates
    pub near_duplicate_ceiling: f64,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            boilerplate_phrases: vec![
                "بسم الله الرحمن الرحيم".to_string(),
                "بِسْمِ اللَّهِ الرَّحْمَٰنِ الرَّحِيمِ".to_string(),
                "بِّسْمِ اللَّهِ الرَّحْمَٰنِ الرَّحِيمِ".to_string(),
                "فَبِأَيِّ آلَاءِ رَبِّكُمَا تُكَذِّبَانِ".to_string(),
                "وَيْلٌ يَوْمَئِذٍ لِّلْمُكَذِّبِينَ".to_string(),
            ],
            opening_phrases: vec![
                "بسم الله الرحمن الرحيم".to_string(),
                "بِسْمِ اللَّهِ الرَّحْمَٰنِ الرَّحِيمِ".to_string(),
                "بِّسْمِ اللَّهِ الرَّحْمَٰنِ الرَّحِيمِ".to_string(),
            ],
            opening_exempt_majors: vec![9],
            near_duplicate_ceiling: 0.99,
        }
    }
}

/// Similarity cache build parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    pub floor_threshold: f64,
    pub max_neighbors: usize,
    pub progress_every: usize, // Log progress every N source verses
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            floor_threshold: 0.1,
            max_neighbors: 50,
            progress_every: 100,
        }
    }
}

/// Word statistics build parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordStatsParams {
    /// Function words left out of the statistics (normalized before use)
    pub stoplist: Vec<String>,
    /// Words shorter than this many letters are skipped
    pub min_word_chars: usize,
}

impl Default for WordStatsParams {
    fn default() -> Self {
        let stoplist = [
            "في", "من", "إلى", "على", "عن", "أن", "إن", "ما", "لا", "هل", "بل", "قد", "سى",
            "كان", "يكون", "قال", "قل", "هو", "هي", "هم", "و",
        ];
        Self {
            stoplist: stoplist.iter().map(|w| w.to_string()).collect(),
            min_word_chars: 2,
        }
    }
}

/// Default query settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefaults {
    pub neighbor_min_similarity: f64,
    pub neighbor_limit: usize,
    pub pairs_min_similarity: f64,
    pub pairs_limit: usize,
    pub exclude_boilerplate: bool,
    pub prefer_cache: bool,
    pub sample_min_similarity: f64,
    pub sample_limit: usize,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            neighbor_min_similarity: 0.4,
            neighbor_limit: 10,
            pairs_min_similarity: 0.7,
            pairs_limit: 100,
            exclude_boilerplate: true,
            prefer_cache: true,
            sample_min_similarity: 0.85,
            sample_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub exclusion: ExclusionConfig,
    pub cache: CacheParams,
    pub word_stats: WordStatsParams,
    pub query: QueryDefaults,
}

impl EngineConfig {
    /// Load a JSON config file. Missing sections keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}
