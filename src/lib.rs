//! Kashshaf Mutashabih Library
//!
//! Detection of similar and repeated verses in a fixed Arabic scripture
//! corpus. Verses are compared word by word after stripping diacritics and
//! folding letterforms, using a longest-matching-block ratio. A precomputed
//! neighbor cache makes repeated lookups near-instant; without one, queries
//! score the corpus directly and return the same ordering.
//!
//! # Example
//!
//! ```no_run
//! use kashshaf_mutashabih::prelude::*;
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let db_path = Path::new("quran.db");
//! let config = EngineConfig::default();
//!
//! let corpus = Arc::new(load_corpus(db_path).unwrap());
//! let policy = Arc::new(ExclusionPolicy::new(&config.exclusion));
//! let store = Arc::new(CacheStore::new());
//!
//! // Build the neighbor cache and publish it
//! let cancel = AtomicBool::new(false);
//! rebuild_cache(&store, &corpus, &policy, &config.cache, true, &cancel);
//!
//! let engine = QueryEngine::new(corpus, policy, store);
//! let result = engine.neighbors_of(2, &NeighborQuery::default()).unwrap();
//!
//! for neighbor in &result.neighbors {
//!     println!("{} {:.2}", neighbor.verse.location(), neighbor.score);
//! }
//! ```
//!
//! # Pair Search Example
//!
//! ```no_run
//! use kashshaf_mutashabih::prelude::*;
//!
//! # fn engine() -> QueryEngine { unimplemented!() }
//! let engine = engine();
//! let query = AllPairsQuery {
//!     target: Scope::Major(2),
//!     compare: Scope::third(1).unwrap(),
//!     min_similarity: 0.8,
//!     ..Default::default()
//! };
//!
//! let result = engine.all_pairs(&query).unwrap();
//! println!("{} pairs via {}", result.pairs.len(), result.method);
//! ```

pub mod cache;
pub mod config;
pub mod corpus;
pub mod db;
pub mod exclusion;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod output;
pub mod query;
pub mod score;
pub mod store;
pub mod wordstats;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cache::{
        build_similarity_cache, cancel_on_interrupt, rebuild_cache, BuildError, RebuildOutcome,
    };
    pub use crate::config::{
        CacheParams, ConfigError, EngineConfig, ExclusionConfig, QueryDefaults, WordStatsParams,
    };
    pub use crate::corpus::{CorpusError, CorpusIndex, Scope};
    pub use crate::db::{
        list_cache_snapshots, load_cache_snapshot, load_corpus, load_verses, load_word_stats,
        save_cache_snapshot, save_word_stats, store_verses, DbError,
    };
    pub use crate::exclusion::ExclusionPolicy;
    pub use crate::models::{
        AllPairsResult, CacheSnapshot, CachedNeighbor, CorpusStats, MatchMethod, NeighborCacheEntry,
        NeighborMatch, NeighborsResult, SampleResult, SimilarPair, Verse, WordStat, WordStats,
        WordSuggestion,
    };
    pub use crate::normalize::{normalize, tokenize};
    pub use crate::output::{
        format_diff, format_pair, print_comparison, print_neighbors, print_pairs,
        print_pairs_summary, print_sample, print_stats, print_suggestions, print_verse,
        print_word_stat, write_neighbors_json, write_pairs_csv, write_pairs_csv_file,
        write_pairs_json, write_pairs_json_file, write_sample_json, OutputError,
    };
    pub use crate::query::{AllPairsQuery, NeighborQuery, PinnedQuery, QueryEngine, QueryError};
    pub use crate::score::{score, word_diff, word_similarity, ComparisonUnit, DiffOp, DiffSegment};
    pub use crate::store::{CacheStore, SnapshotStore, WordStatsStore};
    pub use crate::wordstats::build_word_stats;
}

// Re-export commonly used types at the crate root
pub use corpus::{CorpusIndex, Scope};
pub use exclusion::ExclusionPolicy;
pub use models::{CacheSnapshot, Verse, WordStats};
pub use query::{AllPairsQuery, NeighborQuery, QueryEngine, QueryError};
