//! Batch builder for the neighbor cache.
//!
//! Every verse is scored against every other verse. Neighbors inside the
//! window `[floor_threshold, near_duplicate_ceiling)` are kept, best first,
//! and truncated to `max_neighbors` per source verse. Truncation is applied
//! per source, so the stored relation is not symmetric: W can be among V's
//! neighbors while V has fallen off W's list.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::CacheParams;
use crate::corpus::CorpusIndex;
use crate::exclusion::ExclusionPolicy;
use crate::models::*;
use crate::score::{BlockMatcher, TokenizedCorpus};
use crate::store::CacheStore;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BuildError {
    #[error("Build interrupted after {completed} of {total} verses")]
    Interrupted { completed: usize, total: usize },
}

/// Result of a rebuild-and-publish cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Published { generation: u64, entries: usize },
    /// The build was cancelled; the previously published snapshot stays.
    Interrupted { completed: usize, total: usize },
}

/// Build the neighbor cache for the whole corpus.
///
/// The outer loop runs in parallel. `cancel` is checked before each source
/// verse; once set, the build stops and nothing is returned.
#[tracing::instrument(skip_all, fields(verses = corpus.len(), floor = params.floor_threshold))]
pub fn build_similarity_cache(
    corpus: &CorpusIndex,
    policy: &ExclusionPolicy,
    params: &CacheParams,
    show_progress: bool,
    cancel: &AtomicBool,
) -> Result<CacheSnapshot, BuildError> {
    let total = corpus.len();
    let ceiling = policy.near_duplicate_ceiling();

    if show_progress {
        eprintln!("Tokenizing {} verses...", total);
    }
    let tokenized = TokenizedCorpus::from_texts(corpus.all().iter().map(|v| v.text.as_str()));

    tracing::info!(
        verses = total,
        vocabulary = tokenized.vocabulary_len(),
        max_neighbors = params.max_neighbors,
        "Building similarity cache"
    );

    let progress = if show_progress {
        Some(progress_bar(total as u64))
    } else {
        None
    };

    let completed = AtomicUsize::new(0);

    let entries: Option<Vec<NeighborCacheEntry>> = (0..total)
        .into_par_iter()
        .map_init(BlockMatcher::new, |matcher, position| {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }

            let neighbors = neighbors_at(corpus, &tokenized, matcher, position, params, ceiling);

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
            if params.progress_every > 0 && done % params.progress_every == 0 {
                tracing::info!(completed = done, total, "Cache build progress");
            }

            Some(NeighborCacheEntry {
                verse_id: corpus.verse_at(position).id,
                neighbors,
            })
        })
        .collect();

    let entries = match entries {
        Some(entries) => {
            if let Some(pb) = progress {
                pb.finish_with_message("Done");
            }
            entries
        }
        None => {
            if let Some(pb) = progress {
                pb.abandon_with_message("Interrupted");
            }
            return Err(BuildError::Interrupted {
                completed: completed.load(Ordering::Relaxed),
                total,
            });
        }
    };

    let snapshot = CacheSnapshot {
        format_version: CACHE_FORMAT_VERSION,
        built_at: Utc::now(),
        floor_threshold: params.floor_threshold,
        max_neighbors: params.max_neighbors,
        near_duplicate_ceiling: ceiling,
        verse_count: total,
        entries,
    };

    tracing::info!(
        entries = snapshot.len(),
        links = snapshot.link_count(),
        "Similarity cache built"
    );

    Ok(snapshot)
}

/// Build a fresh cache and publish it to the store.
///
/// An interrupted build is logged and leaves the current snapshot in place.
pub fn rebuild_cache(
    store: &CacheStore,
    corpus: &CorpusIndex,
    policy: &ExclusionPolicy,
    params: &CacheParams,
    show_progress: bool,
    cancel: &AtomicBool,
) -> RebuildOutcome {
    match build_similarity_cache(corpus, policy, params, show_progress, cancel) {
        Ok(snapshot) => {
            let entries = snapshot.len();
            let generation = store.publish(snapshot);
            tracing::info!(generation, entries, "Published similarity cache");
            RebuildOutcome::Published {
                generation,
                entries,
            }
        }
        Err(BuildError::Interrupted { completed, total }) => {
            tracing::warn!(
                completed,
                total,
                generation = store.generation(),
                "Cache rebuild interrupted, keeping previous snapshot"
            );
            RebuildOutcome::Interrupted { completed, total }
        }
    }
}

/// Set `cancel` when the process receives Ctrl-C.
///
/// Returns false, with a warning, when the handler cannot be installed; the
/// build then runs to completion.
pub fn cancel_on_interrupt(cancel: &Arc<AtomicBool>) -> bool {
    let flag = Arc::clone(cancel);
    match ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Could not install Ctrl-C handler; build cannot be interrupted");
            false
        }
    }
}

/// Scored neighbors of the verse at `position`, best first, truncated.
fn neighbors_at(
    corpus: &CorpusIndex,
    tokenized: &TokenizedCorpus,
    matcher: &mut BlockMatcher,
    position: usize,
    params: &CacheParams,
    ceiling: f64,
) -> Vec<CachedNeighbor> {
    let len_a = tokenized.sequence(position).len();

    let mut neighbors: Vec<CachedNeighbor> = (0..tokenized.len())
        .filter(|&other| other != position)
        .filter(|&other| length_bound(len_a, tokenized.sequence(other).len()) >= params.floor_threshold)
        .filter_map(|other| {
            let score = tokenized.ratio(matcher, position, other);
            if score >= params.floor_threshold && score < ceiling {
                Some(CachedNeighbor {
                    verse_id: corpus.verse_at(other).id,
                    score,
                })
            } else {
                None
            }
        })
        .collect();

    sort_neighbors(&mut neighbors);
    neighbors.truncate(params.max_neighbors);
    neighbors
}

/// Upper bound on the ratio given only the two lengths.
#[inline]
pub(crate) fn length_bound(len_a: usize, len_b: usize) -> f64 {
    let total = len_a + len_b;
    if total == 0 {
        1.0
    } else {
        2.0 * len_a.min(len_b) as f64 / total as f64
    }
}

/// Score descending, then neighbor id ascending.
fn sort_neighbors(neighbors: &mut [CachedNeighbor]) {
    neighbors.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.verse_id.cmp(&b.verse_id))
    });
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
