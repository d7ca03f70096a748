//! Similarity queries over the corpus.
//!
//! Two query shapes are served: the ranked neighbors of a single verse, and
//! every similar pair between a target scope and a compare scope. Both use
//! the published neighbor cache when one is available and fall back to
//! scoring directly otherwise. Either way the results come back in the same
//! order: score descending, then verse ids ascending.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;

use crate::cache::length_bound;
use crate::config::QueryDefaults;
use crate::corpus::{CorpusIndex, Scope};
use crate::exclusion::ExclusionPolicy;
use crate::models::*;
use crate::score::{BlockMatcher, TokenizedCorpus};
use crate::store::{CacheStore, WordStatsStore};

/// Target verses scored together before the early-exit check.
const BRUTE_FORCE_CHUNK: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("Verse not found: {0}")]
    NotFound(u32),
    #[error("Invalid scope: {0}")]
    InvalidScope(String),
}

/// Parameters for a single-verse neighbor query
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborQuery {
    pub min_similarity: f64,
    pub limit: usize,
    pub exclude_boilerplate: bool, // Skip division-opening verses as candidates
}

impl From<&QueryDefaults> for NeighborQuery {
    fn from(defaults: &QueryDefaults) -> Self {
        Self {
            min_similarity: defaults.neighbor_min_similarity,
            limit: defaults.neighbor_limit,
            exclude_boilerplate: defaults.exclude_boilerplate,
        }
    }
}

impl Default for NeighborQuery {
    fn default() -> Self {
        Self::from(&QueryDefaults::default())
    }
}

/// Parameters for a scope-vs-scope pair query
#[derive(Debug, Clone, PartialEq)]
pub struct AllPairsQuery {
    pub target: Scope,
    pub compare: Scope,
    pub min_similarity: f64,
    pub limit: usize,
    pub exclude_boilerplate: bool, // Drop division-opening verses from both scopes
    pub prefer_cache: bool,
}

impl From<&QueryDefaults> for AllPairsQuery {
    fn from(defaults: &QueryDefaults) -> Self {
        Self {
            target: Scope::Whole,
            compare: Scope::Whole,
            min_similarity: defaults.pairs_min_similarity,
            limit: defaults.pairs_limit,
            exclude_boilerplate: defaults.exclude_boilerplate,
            prefer_cache: defaults.prefer_cache,
        }
    }
}

impl Default for AllPairsQuery {
    fn default() -> Self {
        Self::from(&QueryDefaults::default())
    }
}

impl AllPairsQuery {
    /// Reject contradictory or malformed scope combinations.
    pub fn validate(&self) -> Result<(), QueryError> {
        validate_scope(&self.target)?;
        validate_scope(&self.compare)?;
        if self.target.is_whole() && !self.compare.is_whole() {
            return Err(QueryError::InvalidScope(format!(
                "compare scope '{}' requires a target scope",
                self.compare
            )));
        }
        Ok(())
    }
}

fn validate_scope(scope: &Scope) -> Result<(), QueryError> {
    match scope {
        Scope::SubdivisionRange(lo, hi) if lo > hi => Err(QueryError::InvalidScope(format!(
            "empty subdivision range {}-{}",
            lo, hi
        ))),
        Scope::Ids(ids) if ids.is_empty() => {
            Err(QueryError::InvalidScope("empty id list".to_string()))
        }
        _ => Ok(()),
    }
}

/// Query engine over an immutable corpus and a swappable neighbor cache.
///
/// Verses are tokenized once at construction. Every operation works on
/// positions in canonical order, which is ascending id order, so sorting by
/// position and sorting by id agree.
pub struct QueryEngine {
    corpus: Arc<CorpusIndex>,
    policy: Arc<ExclusionPolicy>,
    cache: Arc<CacheStore>,
    word_stats: Option<Arc<WordStatsStore>>,
    tokenized: TokenizedCorpus,
    openings: Vec<bool>, // Division-opening flag per position
}

impl QueryEngine {
    pub fn new(corpus: Arc<CorpusIndex>, policy: Arc<ExclusionPolicy>, cache: Arc<CacheStore>) -> Self {
        let tokenized = TokenizedCorpus::from_texts(corpus.all().iter().map(|v| v.text.as_str()));
        let openings = corpus
            .all()
            .iter()
            .map(|v| policy.is_boilerplate_opening(v))
            .collect();

        tracing::debug!(
            verses = corpus.len(),
            vocabulary = tokenized.vocabulary_len(),
            "Query engine ready"
        );

        QueryEngine {
            corpus,
            policy,
            cache,
            word_stats: None,
            tokenized,
            openings,
        }
    }

    /// Attach a word statistics store so `stats` can report on it.
    pub fn with_word_stats(mut self, store: Arc<WordStatsStore>) -> Self {
        self.word_stats = Some(store);
        self
    }

    pub fn corpus(&self) -> &CorpusIndex {
        &self.corpus
    }

    pub fn policy(&self) -> &ExclusionPolicy {
        &self.policy
    }

    pub fn cache_store(&self) -> &CacheStore {
        &self.cache
    }

    /// Acquire the current cache snapshot for the duration of one request.
    pub fn pin(&self) -> PinnedQuery<'_> {
        PinnedQuery {
            engine: self,
            cache: self.cache.current_with_generation(),
        }
    }

    pub fn neighbors_of(&self, verse_id: u32, query: &NeighborQuery) -> Result<NeighborsResult, QueryError> {
        self.pin().neighbors_of(verse_id, query)
    }

    pub fn all_pairs(&self, query: &AllPairsQuery) -> Result<AllPairsResult, QueryError> {
        self.pin().all_pairs(query)
    }

    pub fn sample_with_neighbors<R: Rng + ?Sized>(
        &self,
        limit: usize,
        min_similarity: f64,
        rng: &mut R,
    ) -> SampleResult {
        self.pin().sample_with_neighbors(limit, min_similarity, rng)
    }

    /// Word similarity between two corpus verses.
    pub fn score_verses(&self, id_a: u32, id_b: u32) -> Result<f64, QueryError> {
        let pos_a = self.corpus.position(id_a).ok_or(QueryError::NotFound(id_a))?;
        let pos_b = self.corpus.position(id_b).ok_or(QueryError::NotFound(id_b))?;
        let mut matcher = BlockMatcher::new();
        Ok(self.tokenized.ratio(&mut matcher, pos_a, pos_b))
    }

    pub fn stats(&self) -> CorpusStats {
        let cache = self.cache.current();
        let word_stats = self.word_stats.as_ref().and_then(|store| store.current());

        CorpusStats {
            total_verses: self.corpus.len(),
            total_majors: self.corpus.major_count(),
            total_subdivisions: self.corpus.subdivision_count(),
            vocabulary_size: self.tokenized.vocabulary_len(),
            cache_entries: cache.as_ref().map_or(0, |c| c.len()),
            cache_links: cache.as_ref().map_or(0, |c| c.link_count()),
            cache_generation: self.cache.generation(),
            cache_floor_threshold: cache.as_ref().map(|c| c.floor_threshold),
            word_stats_entries: word_stats.map(|w| w.words.len()),
        }
    }

    /// Is the pair an exact repetition of formulaic text?
    fn is_excluded(&self, pos_a: usize, pos_b: usize, score: f64) -> bool {
        self.policy.is_excluded_normalized(
            self.tokenized.normalized(pos_a),
            self.tokenized.normalized(pos_b),
            score,
        )
    }

    /// Positions selected by a scope, optionally without opening verses.
    fn scope_positions(&self, scope: &Scope, exclude_boilerplate: bool) -> Vec<usize> {
        self.corpus
            .select(scope)
            .into_iter()
            .filter_map(|v| self.corpus.position(v.id))
            .filter(|&p| !(exclude_boilerplate && self.openings[p]))
            .collect()
    }

    fn membership(&self, positions: &[usize]) -> Vec<bool> {
        let mut member = vec![false; self.corpus.len()];
        for &p in positions {
            member[p] = true;
        }
        member
    }
}

/// A query session bound to one cache snapshot.
///
/// Rebuilds published after `pin` do not affect results served through it.
pub struct PinnedQuery<'e> {
    engine: &'e QueryEngine,
    cache: Option<(u64, Arc<CacheSnapshot>)>,
}

impl<'e> PinnedQuery<'e> {
    pub fn snapshot(&self) -> Option<&CacheSnapshot> {
        self.cache.as_ref().map(|(_, snapshot)| snapshot.as_ref())
    }

    /// Generation of the pinned snapshot, if one was published.
    pub fn generation(&self) -> Option<u64> {
        self.cache.as_ref().map(|(generation, _)| *generation)
    }

    /// Ranked neighbors of one verse within `[min_similarity, ceiling)`.
    #[tracing::instrument(skip(self, query), fields(min = query.min_similarity, limit = query.limit))]
    pub fn neighbors_of(&self, verse_id: u32, query: &NeighborQuery) -> Result<NeighborsResult, QueryError> {
        let engine = self.engine;
        let position = engine
            .corpus
            .position(verse_id)
            .ok_or(QueryError::NotFound(verse_id))?;
        let ceiling = engine.policy.near_duplicate_ceiling();

        let (scored, method) = match self.snapshot().and_then(|s| s.entry(verse_id)) {
            Some(entry) => {
                let scored: Vec<(usize, f64)> = entry
                    .neighbors
                    .iter()
                    .filter_map(|n| engine.corpus.position(n.verse_id).map(|p| (p, n.score)))
                    .collect();
                (scored, MatchMethod::CacheAccelerated)
            }
            None => {
                if self.cache.is_none() {
                    tracing::warn!(verse_id, "Neighbor cache unavailable, scoring directly");
                } else {
                    tracing::debug!(verse_id, "No cached entry, scoring directly");
                }
                (self.score_against_corpus(position, query.min_similarity), MatchMethod::BruteForce)
            }
        };

        let mut kept: Vec<(usize, f64)> = scored
            .into_iter()
            .filter(|&(other, score)| {
                other != position
                    && score >= query.min_similarity
                    && score < ceiling
                    && !(query.exclude_boilerplate && engine.openings[other])
                    && !engine.is_excluded(position, other, score)
            })
            .collect();

        kept.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        kept.truncate(query.limit);

        tracing::debug!(found = kept.len(), %method, "Neighbor query done");

        Ok(NeighborsResult {
            verse: engine.corpus.verse_at(position).clone(),
            neighbors: kept
                .into_iter()
                .map(|(other, score)| NeighborMatch {
                    verse: engine.corpus.verse_at(other).clone(),
                    score,
                })
                .collect(),
            method,
        })
    }

    /// Every similar pair between two scopes, best first.
    #[tracing::instrument(skip_all, fields(target = %query.target, compare = %query.compare, min = query.min_similarity))]
    pub fn all_pairs(&self, query: &AllPairsQuery) -> Result<AllPairsResult, QueryError> {
        query.validate()?;
        let start = Instant::now();
        let engine = self.engine;

        let targets = engine.scope_positions(&query.target, query.exclude_boilerplate);
        let compares = engine.scope_positions(&query.compare, query.exclude_boilerplate);

        let use_cache = query.prefer_cache && self.snapshot().is_some();
        if query.prefer_cache && !use_cache {
            tracing::warn!("Neighbor cache unavailable, scoring pairs directly");
        }

        let mut pairs = match (use_cache, self.snapshot()) {
            (true, Some(snapshot)) => self.cached_pairs(snapshot, &targets, &compares, query),
            _ => self.brute_force_pairs(&targets, &compares, query),
        };
        let method = if use_cache {
            MatchMethod::CacheAccelerated
        } else {
            MatchMethod::BruteForce
        };

        pairs.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });

        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(found = pairs.len(), %method, elapsed_ms, "Pair query done");

        Ok(AllPairsResult {
            version: env!("CARGO_PKG_VERSION").to_string(),
            target_scope: query.target.to_string(),
            compare_scope: query.compare.to_string(),
            min_similarity: query.min_similarity,
            method,
            elapsed_ms,
            pairs: pairs
                .into_iter()
                .map(|(a, b, score)| {
                    SimilarPair::new(engine.corpus.verse_at(a), engine.corpus.verse_at(b), score)
                })
                .collect(),
        })
    }

    /// Random verses that each have a neighbor in `[min_similarity, ceiling)`,
    /// at most one per major division.
    ///
    /// Division-opening verses are never drawn and never count as neighbors.
    /// Cached lists answer the neighbor check when the snapshot floor is at
    /// or below `min_similarity`; a truncated list whose in-window entries
    /// are all openings can hide a further neighbor.
    #[tracing::instrument(skip(self, rng))]
    pub fn sample_with_neighbors<R: Rng + ?Sized>(
        &self,
        limit: usize,
        min_similarity: f64,
        rng: &mut R,
    ) -> SampleResult {
        let start = Instant::now();
        let engine = self.engine;
        let ceiling = engine.policy.near_duplicate_ceiling();

        let snapshot = self
            .snapshot()
            .filter(|snapshot| snapshot.floor_threshold <= min_similarity);
        if snapshot.is_none() && self.cache.is_some() {
            tracing::debug!("Cache floor above requested minimum, scoring directly");
        }
        let method = if snapshot.is_some() {
            MatchMethod::CacheAccelerated
        } else {
            MatchMethod::BruteForce
        };

        let mut candidates: Vec<usize> = (0..engine.corpus.len())
            .filter(|&p| !engine.openings[p])
            .collect();
        candidates.shuffle(rng);

        let mut used_majors = HashSet::new();
        let mut verses = Vec::new();

        for position in candidates {
            if verses.len() >= limit {
                break;
            }
            let verse = engine.corpus.verse_at(position);
            if used_majors.contains(&verse.major) {
                continue;
            }

            let in_window = |other: usize, score: f64| {
                other != position
                    && !engine.openings[other]
                    && score >= min_similarity
                    && score < ceiling
            };
            let has_neighbor = match snapshot.and_then(|s| s.entry(verse.id)) {
                Some(entry) => entry.neighbors.iter().any(|n| {
                    engine
                        .corpus
                        .position(n.verse_id)
                        .map_or(false, |other| in_window(other, n.score))
                }),
                None => self
                    .score_against_corpus(position, min_similarity)
                    .into_iter()
                    .any(|(other, score)| in_window(other, score)),
            };

            if has_neighbor {
                used_majors.insert(verse.major);
                verses.push(verse.clone());
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(found = verses.len(), %method, elapsed_ms, "Sample drawn");

        SampleResult {
            min_similarity,
            method,
            elapsed_ms,
            verses,
        }
    }

    /// Score one verse against every other verse whose length allows `min`.
    fn score_against_corpus(&self, position: usize, min: f64) -> Vec<(usize, f64)> {
        let tokenized = &self.engine.tokenized;
        let len_a = tokenized.sequence(position).len();

        (0..tokenized.len())
            .into_par_iter()
            .filter(|&other| other != position)
            .filter(|&other| length_bound(len_a, tokenized.sequence(other).len()) >= min)
            .map_init(BlockMatcher::new, |matcher, other| {
                (other, tokenized.ratio(matcher, position, other))
            })
            .collect()
    }

    /// Walk the cached neighbor lists of the target verses.
    ///
    /// Target verses without a cached entry contribute nothing.
    fn cached_pairs(
        &self,
        snapshot: &CacheSnapshot,
        targets: &[usize],
        compares: &[usize],
        query: &AllPairsQuery,
    ) -> Vec<(usize, usize, f64)> {
        let engine = self.engine;
        let in_compare = engine.membership(compares);
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut found = Vec::new();
        let mut missing = 0usize;

        'targets: for &target in targets {
            let Some(entry) = snapshot.entry(engine.corpus.verse_at(target).id) else {
                missing += 1;
                continue;
            };

            for neighbor in &entry.neighbors {
                if found.len() >= query.limit {
                    break 'targets;
                }
                if neighbor.score < query.min_similarity {
                    continue;
                }
                let Some(other) = engine.corpus.position(neighbor.verse_id) else {
                    continue;
                };
                if other == target || !in_compare[other] {
                    continue;
                }
                if engine.is_excluded(target, other, neighbor.score) {
                    continue;
                }

                let key = (target.min(other), target.max(other));
                if seen.insert(key) {
                    found.push((key.0, key.1, neighbor.score));
                }
            }
        }

        if missing > 0 {
            tracing::debug!(missing, "Target verses without a cached entry");
        }
        found.truncate(query.limit);
        found
    }

    /// Nested loop over target × compare.
    ///
    /// Self pairs are skipped, and so is (t, c) when the same unordered pair
    /// is reached again as (c, t) with c earlier in canonical order. When
    /// both scopes are equal this is the `id_a < id_b` rule. Results are
    /// collected in target order so the early exit at `limit` is
    /// deterministic.
    fn brute_force_pairs(
        &self,
        targets: &[usize],
        compares: &[usize],
        query: &AllPairsQuery,
    ) -> Vec<(usize, usize, f64)> {
        let engine = self.engine;
        let tokenized = &engine.tokenized;
        let in_target = engine.membership(targets);
        let in_compare = engine.membership(compares);
        let mut found = Vec::new();

        for chunk in targets.chunks(BRUTE_FORCE_CHUNK) {
            if found.len() >= query.limit {
                break;
            }

            let rows: Vec<Vec<(usize, usize, f64)>> = chunk
                .par_iter()
                .map_init(BlockMatcher::new, |matcher, &target| {
                    let len_a = tokenized.sequence(target).len();
                    compares
                        .iter()
                        .copied()
                        .filter(|&other| other != target)
                        .filter(|&other| !(other < target && in_target[other] && in_compare[target]))
                        .filter(|&other| {
                            length_bound(len_a, tokenized.sequence(other).len()) >= query.min_similarity
                        })
                        .filter_map(|other| {
                            let score = tokenized.ratio(matcher, target, other);
                            if score >= query.min_similarity && !engine.is_excluded(target, other, score) {
                                Some((target.min(other), target.max(other), score))
                            } else {
                                None
                            }
                        })
                        .collect::<Vec<_>>()
                })
                .collect();

            for pair in rows.into_iter().flatten() {
                if found.len() >= query.limit {
                    break;
                }
                found.push(pair);
            }
        }

        found
    }
}
