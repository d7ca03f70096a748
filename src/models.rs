//! Data structures for the verse similarity engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artifact format written by this version of the cache builder
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Artifact format written by this version of the word statistics builder
pub const WORD_STATS_FORMAT_VERSION: u32 = 1;

/// A single verse of the corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    pub id: u32,
    pub major: u32,          // Major division (surah)
    pub major_name: String,  // Display label of the major division
    pub minor: u32,          // Position within the major division (ayah)
    pub text: String,        // Raw script, never modified
    pub subdivision: u32,    // Orthogonal grouping (juz)
}

impl Verse {
    /// Location label used in printed output, e.g. "2:255"
    pub fn location(&self) -> String {
        format!("{}:{}", self.major, self.minor)
    }
}

// ============================================================================
// Neighbor cache
// ============================================================================

/// One neighbor in a cached list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedNeighbor {
    pub verse_id: u32,
    pub score: f64,
}

/// Precomputed neighbors of one source verse, best first.
///
/// Lists are truncated per source verse, so W may appear in V's list
/// while V is missing from W's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborCacheEntry {
    pub verse_id: u32,
    pub neighbors: Vec<CachedNeighbor>,
}

/// Full output of one cache build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub format_version: u32,
    pub built_at: DateTime<Utc>,
    pub floor_threshold: f64,
    pub max_neighbors: usize,
    pub near_duplicate_ceiling: f64,
    pub verse_count: usize,
    pub entries: Vec<NeighborCacheEntry>, // Sorted by verse_id
}

impl CacheSnapshot {
    /// Cached entry for a verse, if the build produced one.
    pub fn entry(&self, verse_id: u32) -> Option<&NeighborCacheEntry> {
        self.entries
            .binary_search_by_key(&verse_id, |e| e.verse_id)
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Total number of cached (source, neighbor) links
    pub fn link_count(&self) -> usize {
        self.entries.iter().map(|e| e.neighbors.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Query results
// ============================================================================

/// Which path served a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    CacheAccelerated,
    BruteForce,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMethod::CacheAccelerated => write!(f, "cache_accelerated"),
            MatchMethod::BruteForce => write!(f, "brute_force"),
        }
    }
}

/// A similar verse returned for a single-verse query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborMatch {
    pub verse: Verse,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborsResult {
    pub verse: Verse,
    pub neighbors: Vec<NeighborMatch>,
    pub method: MatchMethod,
}

/// An unordered pair of similar verses, `verse_a.id < verse_b.id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPair {
    pub verse_a: Verse,
    pub verse_b: Verse,
    pub score: f64,
    pub score_percent: u32,
}

impl SimilarPair {
    pub fn new(first: &Verse, second: &Verse, score: f64) -> Self {
        let (verse_a, verse_b) = if first.id <= second.id {
            (first.clone(), second.clone())
        } else {
            (second.clone(), first.clone())
        };
        SimilarPair {
            verse_a,
            verse_b,
            score,
            score_percent: (score * 100.0) as u32,
        }
    }

    pub fn ids(&self) -> (u32, u32) {
        (self.verse_a.id, self.verse_b.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllPairsResult {
    pub version: String,
    pub target_scope: String,
    pub compare_scope: String,
    pub min_similarity: f64,
    pub method: MatchMethod,
    pub elapsed_ms: u64,
    pub pairs: Vec<SimilarPair>,
}

/// Randomly drawn verses that each have a close neighbor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    pub min_similarity: f64,
    pub method: MatchMethod,
    pub elapsed_ms: u64,
    pub verses: Vec<Verse>,
}

/// Corpus and artifact statistics
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub total_verses: usize,
    pub total_majors: usize,
    pub total_subdivisions: usize,
    pub vocabulary_size: usize,
    pub cache_entries: usize,
    pub cache_links: usize,
    pub cache_generation: u64,
    pub cache_floor_threshold: Option<f64>,
    pub word_stats_entries: Option<usize>,
}

// ============================================================================
// Word statistics
// ============================================================================

/// Occurrences of a word inside one verse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordOccurrence {
    pub verse_id: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorCount {
    pub major: u32,
    pub major_name: String,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdivisionCount {
    pub subdivision: u32,
    pub count: u32,
}

/// Statistics for one normalized word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordStat {
    pub word: String,
    pub total_count: u32,
    pub verse_count: u32,
    pub occurrences: Vec<WordOccurrence>,     // Corpus order
    pub by_major: Vec<MajorCount>,            // Sorted by count, descending
    pub by_subdivision: Vec<SubdivisionCount>, // Sorted by count, descending
}

/// An autocomplete suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordSuggestion {
    pub word: String,
    pub total_count: u32,
    pub verse_count: u32,
}

/// Full output of one word statistics build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordStats {
    pub format_version: u32,
    pub built_at: DateTime<Utc>,
    pub verse_count: usize,
    pub words: Vec<WordStat>, // Sorted by word
}
