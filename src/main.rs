//! Kashshaf Mutashabih command-line tool
//!
//! Builds the neighbor cache and word statistics for a verse corpus stored
//! in SQLite, and answers similar-verse queries against it.

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use kashshaf_mutashabih::cache::{cancel_on_interrupt, rebuild_cache, RebuildOutcome};
use kashshaf_mutashabih::config::{CacheParams, EngineConfig};
use kashshaf_mutashabih::corpus::Scope;
use kashshaf_mutashabih::db::{
    load_cache_snapshot, load_corpus, load_word_stats, save_cache_snapshot, save_word_stats,
};
use kashshaf_mutashabih::exclusion::ExclusionPolicy;
use kashshaf_mutashabih::logging::init_tracing;
use kashshaf_mutashabih::models::WordStats;
use kashshaf_mutashabih::output::{
    print_comparison, print_neighbors, print_pairs, print_pairs_summary, print_sample,
    print_stats, print_suggestions, print_verse, print_word_stat, write_neighbors_json,
    write_pairs_csv_file, write_pairs_json, write_pairs_json_file, write_sample_json,
};
use kashshaf_mutashabih::query::{AllPairsQuery, NeighborQuery, QueryEngine};
use kashshaf_mutashabih::score::word_diff;
use kashshaf_mutashabih::store::{CacheStore, WordStatsStore};
use kashshaf_mutashabih::wordstats::build_word_stats;

#[derive(Parser)]
#[command(name = "kashshaf-mutashabih")]
#[command(about = "Similar-verse detection for Arabic scripture corpora")]
#[command(version)]
struct Cli {
    /// Engine configuration file (JSON); missing keys keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for pair results
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the neighbor cache and store it in the database
    ///
    /// Ctrl-C stops the build; nothing is written in that case.
    BuildCache {
        /// Path to the corpus database
        #[arg(long)]
        corpus_db: PathBuf,

        /// Lowest score kept in neighbor lists [default: 0.1]
        #[arg(long)]
        floor_threshold: Option<f64>,

        /// Neighbors kept per verse [default: 50]
        #[arg(long)]
        max_neighbors: Option<usize>,

        /// Suppress progress output
        #[arg(long)]
        quiet: bool,
    },

    /// Build word statistics and store them in the database
    BuildWordStats {
        #[arg(long)]
        corpus_db: PathBuf,
    },

    /// Find verses similar to one verse
    Similar {
        #[arg(long)]
        corpus_db: PathBuf,

        /// Verse id
        #[arg(long)]
        verse_id: u32,

        /// Minimum similarity [default: 0.4]
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Maximum number of neighbors [default: 10]
        #[arg(long)]
        limit: Option<usize>,

        /// Keep division-opening verses as candidates
        #[arg(long)]
        include_boilerplate: bool,

        /// Ignore the stored cache and score directly
        #[arg(long)]
        no_cache: bool,

        /// Use the cache built with this floor threshold (latest otherwise)
        #[arg(long)]
        cache_threshold: Option<f64>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Find all similar pairs between a target scope and a compare scope
    AllPairs {
        #[arg(long)]
        corpus_db: PathBuf,

        /// Target: one major division
        #[arg(long, conflicts_with_all = ["subdivision", "third", "ids"])]
        major: Option<u32>,

        /// Target: one subdivision
        #[arg(long, conflicts_with_all = ["third", "ids"])]
        subdivision: Option<u32>,

        /// Target: one third of the subdivisions (1-3)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=3), conflicts_with = "ids")]
        third: Option<u32>,

        /// Target: explicit verse ids (comma separated)
        #[arg(long, value_delimiter = ',')]
        ids: Vec<u32>,

        /// Compare against one major division (requires a target)
        #[arg(long, conflicts_with = "compare_subdivision")]
        compare_major: Option<u32>,

        /// Compare against one subdivision (requires a target)
        #[arg(long)]
        compare_subdivision: Option<u32>,

        /// Minimum similarity [default: 0.7]
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Maximum number of pairs [default: 100]
        #[arg(long)]
        limit: Option<usize>,

        /// Keep division-opening verses in both scopes
        #[arg(long)]
        include_boilerplate: bool,

        /// Ignore the stored cache and score directly
        #[arg(long)]
        no_cache: bool,

        /// Write results to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output file format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Print first N pairs to console
        #[arg(long)]
        show_pairs: Option<usize>,
    },

    /// Draw random verses that have a close neighbor, one per major division
    Sample {
        #[arg(long)]
        corpus_db: PathBuf,

        /// Number of verses [default: 10]
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum neighbor similarity [default: 0.85]
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Seed for a reproducible draw
        #[arg(long)]
        seed: Option<u64>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show one verse by major division and verse number
    Verse {
        #[arg(long)]
        corpus_db: PathBuf,

        #[arg(long)]
        major: u32,

        #[arg(long)]
        minor: u32,
    },

    /// Compare two verses and show a word diff
    Compare {
        #[arg(long)]
        corpus_db: PathBuf,

        #[arg(long)]
        verse_a: u32,

        #[arg(long)]
        verse_b: u32,
    },

    /// Show statistics for a word
    Word {
        #[arg(long)]
        corpus_db: PathBuf,

        #[arg(long)]
        word: String,

        /// Verses listed
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Suggest words starting with a prefix
    Autocomplete {
        #[arg(long)]
        corpus_db: PathBuf,

        #[arg(long)]
        prefix: String,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show corpus and artifact statistics
    Stats {
        #[arg(long)]
        corpus_db: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json)?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::BuildCache {
            corpus_db,
            floor_threshold,
            max_neighbors,
            quiet,
        } => {
            let defaults = config.cache.clone();
            let params = CacheParams {
                floor_threshold: floor_threshold.unwrap_or(defaults.floor_threshold),
                max_neighbors: max_neighbors.unwrap_or(defaults.max_neighbors),
                progress_every: defaults.progress_every,
            };

            let corpus = load_corpus(&corpus_db)?;
            let policy = ExclusionPolicy::new(&config.exclusion);
            let store = CacheStore::new();

            let cancel = Arc::new(AtomicBool::new(false));
            cancel_on_interrupt(&cancel);

            match rebuild_cache(&store, &corpus, &policy, &params, !quiet, &cancel) {
                RebuildOutcome::Published { entries, .. } => {
                    if let Some(snapshot) = store.current() {
                        save_cache_snapshot(&corpus_db, &snapshot)?;
                        if !quiet {
                            eprintln!(
                                "Cached {} verses ({} links) at threshold {:.2}",
                                entries,
                                snapshot.link_count(),
                                params.floor_threshold
                            );
                        }
                    }
                }
                RebuildOutcome::Interrupted { completed, total } => {
                    eprintln!("Interrupted after {}/{} verses; cache not saved", completed, total);
                    std::process::exit(130);
                }
            }
        }

        Commands::BuildWordStats { corpus_db } => {
            let corpus = load_corpus(&corpus_db)?;
            let stats = build_word_stats(&corpus, &config.word_stats);
            save_word_stats(&corpus_db, &stats)?;
            eprintln!("Stored statistics for {} words", stats.len());
        }

        Commands::Similar {
            corpus_db,
            verse_id,
            min_similarity,
            limit,
            include_boilerplate,
            no_cache,
            cache_threshold,
            json,
        } => {
            let engine = open_engine(&corpus_db, &config, !no_cache, cache_threshold)?;

            let defaults = NeighborQuery::from(&config.query);
            let query = NeighborQuery {
                min_similarity: min_similarity.unwrap_or(defaults.min_similarity),
                limit: limit.unwrap_or(defaults.limit),
                exclude_boilerplate: !include_boilerplate && defaults.exclude_boilerplate,
            };

            let result = engine.neighbors_of(verse_id, &query)?;
            if json {
                write_neighbors_json(&result, &mut std::io::stdout().lock())?;
                println!();
            } else {
                print_neighbors(&result);
            }
        }

        Commands::AllPairs {
            corpus_db,
            major,
            subdivision,
            third,
            ids,
            compare_major,
            compare_subdivision,
            min_similarity,
            limit,
            include_boilerplate,
            no_cache,
            output,
            format,
            show_pairs,
        } => {
            let target = if !ids.is_empty() {
                Scope::Ids(ids)
            } else if let Some(n) = third {
                Scope::third(n).unwrap_or(Scope::Whole)
            } else if let Some(id) = major {
                Scope::Major(id)
            } else if let Some(id) = subdivision {
                Scope::Subdivision(id)
            } else {
                Scope::Whole
            };
            let compare = match (compare_major, compare_subdivision) {
                (Some(id), _) => Scope::Major(id),
                (None, Some(id)) => Scope::Subdivision(id),
                (None, None) => Scope::Whole,
            };

            let engine = open_engine(&corpus_db, &config, !no_cache, None)?;

            let defaults = AllPairsQuery::from(&config.query);
            let query = AllPairsQuery {
                target,
                compare,
                min_similarity: min_similarity.unwrap_or(defaults.min_similarity),
                limit: limit.unwrap_or(defaults.limit),
                exclude_boilerplate: !include_boilerplate && defaults.exclude_boilerplate,
                prefer_cache: !no_cache && defaults.prefer_cache,
            };

            let result = engine.all_pairs(&query)?;

            match output {
                Some(path) => {
                    match format {
                        OutputFormat::Json => write_pairs_json_file(&result, &path)?,
                        OutputFormat::Csv => write_pairs_csv_file(&result.pairs, &path)?,
                    }
                    print_pairs_summary(&result);
                    eprintln!("\nOutput: {}", path.display());
                }
                None if show_pairs.is_none() => {
                    write_pairs_json(&result, &mut std::io::stdout().lock())?;
                    println!();
                }
                None => print_pairs_summary(&result),
            }

            if let Some(n) = show_pairs {
                println!("\n=== Top Pairs ===");
                print_pairs(&result.pairs, Some(n));
            }
        }

        Commands::Sample {
            corpus_db,
            limit,
            min_similarity,
            seed,
            json,
        } => {
            let engine = open_engine(&corpus_db, &config, true, None)?;
            let limit = limit.unwrap_or(config.query.sample_limit);
            let min_similarity = min_similarity.unwrap_or(config.query.sample_min_similarity);

            let result = match seed {
                Some(seed) => {
                    engine.sample_with_neighbors(limit, min_similarity, &mut StdRng::seed_from_u64(seed))
                }
                None => engine.sample_with_neighbors(limit, min_similarity, &mut rand::thread_rng()),
            };

            if json {
                write_sample_json(&result, &mut std::io::stdout().lock())?;
                println!();
            } else {
                print_sample(&result);
            }
        }

        Commands::Verse {
            corpus_db,
            major,
            minor,
        } => {
            let corpus = load_corpus(&corpus_db)?;
            match corpus.by_position(major, minor) {
                Some(verse) => print_verse(verse),
                None => {
                    eprintln!("No verse at {}:{}", major, minor);
                    std::process::exit(1);
                }
            }
        }

        Commands::Compare {
            corpus_db,
            verse_a,
            verse_b,
        } => {
            let engine = open_engine(&corpus_db, &config, false, None)?;
            let score = engine.score_verses(verse_a, verse_b)?;

            let corpus = engine.corpus();
            if let (Some(a), Some(b)) = (corpus.by_id(verse_a), corpus.by_id(verse_b)) {
                let segments = word_diff(&a.text, &b.text);
                print_comparison(a, b, score, &segments);
            }
        }

        Commands::Word {
            corpus_db,
            word,
            limit,
        } => {
            let corpus = load_corpus(&corpus_db)?;
            let stats = word_stats_or_build(&corpus_db, &corpus, &config)?;
            match stats.lookup(&word) {
                Some(stat) => print_word_stat(stat, &corpus, limit),
                None => println!("No occurrences of '{}'", word),
            }
        }

        Commands::Autocomplete {
            corpus_db,
            prefix,
            limit,
        } => {
            let corpus = load_corpus(&corpus_db)?;
            let stats = word_stats_or_build(&corpus_db, &corpus, &config)?;
            print_suggestions(&prefix, &stats.prefix_search(&prefix, limit));
        }

        Commands::Stats { corpus_db } => {
            let engine = open_engine(&corpus_db, &config, true, None)?;
            let word_stats = Arc::new(WordStatsStore::new());
            if let Some(stats) = load_word_stats(&corpus_db)? {
                word_stats.publish(stats);
            }
            let engine = engine.with_word_stats(word_stats);
            print_stats(&engine.stats());
        }
    }

    Ok(())
}

/// Load the corpus and, when requested, the stored neighbor cache.
fn open_engine(
    corpus_db: &Path,
    config: &EngineConfig,
    use_cache: bool,
    cache_threshold: Option<f64>,
) -> Result<QueryEngine, Box<dyn std::error::Error>> {
    let corpus = Arc::new(load_corpus(corpus_db)?);
    let policy = Arc::new(ExclusionPolicy::new(&config.exclusion));
    let store = Arc::new(CacheStore::new());

    if use_cache {
        match load_cache_snapshot(corpus_db, cache_threshold)? {
            Some(snapshot) => {
                if snapshot.verse_count != corpus.len() {
                    tracing::warn!(
                        cached = snapshot.verse_count,
                        corpus = corpus.len(),
                        "Cache was built for a different corpus size"
                    );
                }
                store.publish(snapshot);
            }
            None => tracing::warn!("No similarity cache stored; run build-cache"),
        }
    }

    Ok(QueryEngine::new(corpus, policy, store))
}

/// Stored word statistics, or a fresh in-memory build when none are stored.
fn word_stats_or_build(
    corpus_db: &Path,
    corpus: &kashshaf_mutashabih::CorpusIndex,
    config: &EngineConfig,
) -> Result<WordStats, Box<dyn std::error::Error>> {
    match load_word_stats(corpus_db)? {
        Some(stats) => Ok(stats),
        None => {
            tracing::info!("No word statistics stored; building in memory");
            Ok(build_word_stats(corpus, &config.word_stats))
        }
    }
}
