//! Integration tests for kashshaf-mutashabih.
//!
//! These tests run the corpus -> cache -> query pipeline end to end.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kashshaf_mutashabih::cache::{build_similarity_cache, rebuild_cache, RebuildOutcome};
use kashshaf_mutashabih::config::{CacheParams, EngineConfig};
use kashshaf_mutashabih::corpus::{CorpusIndex, Scope};
use kashshaf_mutashabih::db::{load_cache_snapshot, load_corpus, save_cache_snapshot, store_verses};
use kashshaf_mutashabih::exclusion::ExclusionPolicy;
use kashshaf_mutashabih::models::{CacheSnapshot, MatchMethod, Verse};
use kashshaf_mutashabih::normalize::normalize;
use kashshaf_mutashabih::query::{AllPairsQuery, NeighborQuery, QueryEngine, QueryError};
use kashshaf_mutashabih::score::{score, word_similarity, ComparisonUnit};
use kashshaf_mutashabih::store::CacheStore;

fn verse(id: u32, major: u32, minor: u32, subdivision: u32, text: &str) -> Verse {
    Verse {
        id,
        major,
        major_name: format!("سورة {}", major),
        minor,
        text: text.to_string(),
        subdivision,
    }
}

/// A corpus of short verses drawn from a small vocabulary so that many
/// pairs overlap. Deterministic for a given seed.
fn generated_corpus(count: u32, seed: u64) -> Vec<Verse> {
    let vocabulary = [
        "قال", "رب", "الله", "الذين", "امنوا", "الارض", "السماء", "يوم", "الناس", "عذاب",
        "عليم", "حكيم", "كفروا", "الحق",
    ];
    let mut rng = StdRng::seed_from_u64(seed);

    (0..count)
        .map(|i| {
            let len = rng.gen_range(3..9);
            let text = (0..len)
                .map(|_| vocabulary[rng.gen_range(0..vocabulary.len())])
                .collect::<Vec<_>>()
                .join(" ");
            verse(i + 1, i / 10 + 1, i % 10 + 2, i / 20 + 1, &text)
        })
        .collect()
}

fn build(corpus: &CorpusIndex, params: &CacheParams) -> CacheSnapshot {
    build_similarity_cache(
        corpus,
        &ExclusionPolicy::default(),
        params,
        false,
        &AtomicBool::new(false),
    )
    .unwrap()
}

fn engine(corpus: Arc<CorpusIndex>, snapshot: Option<CacheSnapshot>) -> QueryEngine {
    let store = match snapshot {
        Some(snapshot) => CacheStore::with_snapshot(snapshot),
        None => CacheStore::new(),
    };
    QueryEngine::new(corpus, Arc::new(ExclusionPolicy::default()), Arc::new(store))
}

#[test]
fn test_three_verse_example() {
    let v1 = "قل هو الله احد";
    let v2 = "قل هو الله أحد";
    let v3 = "والعصر ان الانسان لفي خسر";

    assert_eq!(normalize(v1), normalize(v2));
    assert_eq!(score(v1, v2, ComparisonUnit::Words), 1.0);
    assert!(score(v1, v3, ComparisonUnit::Words) < 0.3);

    let corpus = Arc::new(
        CorpusIndex::new(vec![
            verse(1, 112, 1, 30, v1),
            verse(2, 112, 2, 30, v2),
            verse(3, 103, 1, 30, v3),
        ])
        .unwrap(),
    );
    let engine = engine(corpus, None);

    let query = AllPairsQuery {
        min_similarity: 0.9,
        limit: 10,
        ..Default::default()
    };
    let result = engine.all_pairs(&query).unwrap();

    assert_eq!(result.method, MatchMethod::BruteForce);
    assert_eq!(result.pairs.len(), 1);
    assert_eq!(result.pairs[0].ids(), (1, 2));
    assert_eq!(result.pairs[0].score, 1.0);
}

#[test]
fn test_cache_and_brute_force_agree() {
    let corpus = Arc::new(CorpusIndex::new(generated_corpus(80, 7)).unwrap());
    let params = CacheParams {
        floor_threshold: 0.3,
        max_neighbors: 50,
        progress_every: 0,
    };
    let snapshot = build(&corpus, &params);
    let engine = engine(Arc::clone(&corpus), Some(snapshot.clone()));

    let mut query = AllPairsQuery {
        min_similarity: 0.3,
        limit: 100_000,
        exclude_boilerplate: false,
        prefer_cache: true,
        ..Default::default()
    };
    let cached = engine.all_pairs(&query).unwrap();
    query.prefer_cache = false;
    let direct = engine.all_pairs(&query).unwrap();

    assert_eq!(cached.method, MatchMethod::CacheAccelerated);
    assert_eq!(direct.method, MatchMethod::BruteForce);

    // Neighbor lists are truncated per source, so a pair is reachable from
    // the cache only when one side lists the other.
    let listed = |a: u32, b: u32| {
        snapshot
            .entry(a)
            .map_or(false, |e| e.neighbors.iter().any(|n| n.verse_id == b))
    };
    let expected: Vec<((u32, u32), f64)> = direct
        .pairs
        .iter()
        .filter(|p| p.score < 0.99)
        .filter(|p| {
            let (a, b) = p.ids();
            listed(a, b) || listed(b, a)
        })
        .map(|p| (p.ids(), p.score))
        .collect();
    let got: Vec<((u32, u32), f64)> = cached.pairs.iter().map(|p| (p.ids(), p.score)).collect();

    assert!(!got.is_empty());
    assert_eq!(got, expected);

    for result in [&cached, &direct] {
        for w in result.pairs.windows(2) {
            assert!(w[0].score > w[1].score || (w[0].score == w[1].score && w[0].ids() < w[1].ids()));
        }
    }
}

#[test]
fn test_cached_scores_match_text_scores() {
    let corpus = CorpusIndex::new(generated_corpus(40, 11)).unwrap();
    let snapshot = build(&corpus, &CacheParams::default());

    for entry in &snapshot.entries {
        let a = &corpus.by_id(entry.verse_id).unwrap().text;
        for neighbor in &entry.neighbors {
            let b = &corpus.by_id(neighbor.verse_id).unwrap().text;
            assert_eq!(neighbor.score, word_similarity(a, b));
            assert_eq!(neighbor.score, word_similarity(b, a));
        }
    }
}

#[test]
fn test_truncated_lists_are_asymmetric() {
    // Documented limitation: each list is truncated on its own, so the
    // cached relation need not be symmetric.
    let corpus = CorpusIndex::new(generated_corpus(80, 3)).unwrap();
    let params = CacheParams {
        floor_threshold: 0.1,
        max_neighbors: 2,
        progress_every: 0,
    };
    let snapshot = build(&corpus, &params);

    let mut one_sided = 0;
    for entry in &snapshot.entries {
        assert!(entry.neighbors.len() <= 2);
        for neighbor in &entry.neighbors {
            let back = snapshot.entry(neighbor.verse_id).unwrap();
            if !back.neighbors.iter().any(|n| n.verse_id == entry.verse_id) {
                one_sided += 1;
            }
        }
    }
    assert!(one_sided > 0);
}

#[test]
fn test_scope_validation() {
    let corpus = Arc::new(CorpusIndex::new(generated_corpus(20, 1)).unwrap());
    let engine = engine(corpus, None);

    let query = AllPairsQuery {
        target: Scope::Whole,
        compare: Scope::Subdivision(1),
        ..Default::default()
    };
    assert!(matches!(engine.all_pairs(&query), Err(QueryError::InvalidScope(_))));

    let query = AllPairsQuery {
        target: Scope::third(1).unwrap(),
        compare: Scope::Subdivision(1),
        ..Default::default()
    };
    assert!(engine.all_pairs(&query).is_ok());

    assert_eq!(
        engine.neighbors_of(999, &NeighborQuery::default()).unwrap_err(),
        QueryError::NotFound(999)
    );
}

#[test]
fn test_exclusion_of_formulaic_repeats() {
    let policy = ExclusionPolicy::default();
    let plain = "بسم الله الرحمن الرحيم";
    let vocalized = "بِسْمِ اللَّهِ الرَّحْمَٰنِ الرَّحِيمِ";
    assert!(policy.is_excluded_exact_match(plain, vocalized));

    let a = "الذين يؤمنون بالغيب ويقيمون الصلاه ومما رزقناهم ينفقون";
    let b = "الذين يؤمنون بالغيب ويقيمون الصلاه ومما رزقناهم يكفرون";
    assert!(word_similarity(a, b) > 0.8 && word_similarity(a, b) < 0.99);
    assert!(!policy.is_excluded_exact_match(a, b));

    // Opening verses are only dropped from results when asked
    let corpus = Arc::new(
        CorpusIndex::new(vec![
            verse(1, 1, 1, 1, vocalized),
            verse(2, 2, 1, 1, plain),
            verse(3, 9, 1, 10, plain),
        ])
        .unwrap(),
    );
    let engine = engine(corpus, None);
    let mut query = AllPairsQuery {
        min_similarity: 0.5,
        ..Default::default()
    };
    assert!(engine.all_pairs(&query).unwrap().pairs.is_empty());

    query.exclude_boilerplate = false;
    assert!(engine.all_pairs(&query).unwrap().pairs.is_empty());
}

#[test]
fn test_rebuild_does_not_disturb_pinned_queries() {
    let corpus = Arc::new(CorpusIndex::new(generated_corpus(60, 5)).unwrap());
    let engine = Arc::new(engine(
        Arc::clone(&corpus),
        Some(build(&corpus, &CacheParams::default())),
    ));
    let query = NeighborQuery {
        min_similarity: 0.1,
        limit: 50,
        exclude_boilerplate: false,
    };

    let pinned = engine.pin();
    let before = pinned.neighbors_of(10, &query).unwrap();
    assert_eq!(before.method, MatchMethod::CacheAccelerated);
    assert!(before.neighbors.len() > 1);

    let rebuild = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let params = CacheParams {
                max_neighbors: 1,
                ..Default::default()
            };
            rebuild_cache(
                engine.cache_store(),
                engine.corpus(),
                engine.policy(),
                &params,
                false,
                &AtomicBool::new(false),
            )
        })
    };
    let outcome = rebuild.join().unwrap();
    assert!(matches!(outcome, RebuildOutcome::Published { generation: 2, .. }));

    let after = pinned.neighbors_of(10, &query).unwrap();
    assert_eq!(before.neighbors, after.neighbors);
    assert_eq!(pinned.generation(), Some(1));

    let fresh = engine.neighbors_of(10, &query).unwrap();
    assert!(fresh.neighbors.len() <= 1);
}

#[test]
fn test_concurrent_queries_during_rebuild() {
    let corpus = Arc::new(CorpusIndex::new(generated_corpus(60, 9)).unwrap());
    let engine = Arc::new(engine(
        Arc::clone(&corpus),
        Some(build(&corpus, &CacheParams::default())),
    ));

    let readers: Vec<_> = (0..4)
        .map(|reader| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let query = NeighborQuery {
                    min_similarity: 0.1,
                    limit: 50,
                    exclude_boilerplate: false,
                };
                for round in 0..20u32 {
                    let id = (reader * 20 + round) % 60 + 1;
                    let result = engine.neighbors_of(id, &query).unwrap();
                    assert_eq!(result.method, MatchMethod::CacheAccelerated);
                    let ids: HashSet<u32> = result.neighbors.iter().map(|n| n.verse.id).collect();
                    assert_eq!(ids.len(), result.neighbors.len());
                }
            })
        })
        .collect();

    for _ in 0..3 {
        rebuild_cache(
            engine.cache_store(),
            engine.corpus(),
            engine.policy(),
            &CacheParams::default(),
            false,
            &AtomicBool::new(false),
        );
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(engine.cache_store().generation(), 4);
}

#[test]
fn test_database_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("quran.db");

    store_verses(&db_path, &generated_corpus(30, 13)).unwrap();
    let corpus = Arc::new(load_corpus(&db_path).unwrap());
    assert_eq!(corpus.len(), 30);

    let config = EngineConfig::default();
    let snapshot = build(&corpus, &config.cache);
    save_cache_snapshot(&db_path, &snapshot).unwrap();

    let loaded = load_cache_snapshot(&db_path, Some(config.cache.floor_threshold))
        .unwrap()
        .unwrap();
    assert_eq!(loaded, snapshot);

    let query = AllPairsQuery {
        min_similarity: 0.4,
        limit: 1000,
        exclude_boilerplate: false,
        ..Default::default()
    };
    let from_memory = engine(Arc::clone(&corpus), Some(snapshot)).all_pairs(&query).unwrap();
    let from_disk = engine(corpus, Some(loaded)).all_pairs(&query).unwrap();
    assert_eq!(from_memory.pairs, from_disk.pairs);
}
