//! SQLite persistence for the corpus and built artifacts.
//!
//! The corpus lives in the `verses` table. Cache snapshots and word
//! statistics are stored as JSON payloads, one cache row per floor threshold
//! and a single word statistics row.

use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

use crate::corpus::{CorpusError, CorpusIndex};
use crate::models::{CacheSnapshot, Verse, WordStats, CACHE_FORMAT_VERSION, WORD_STATS_FORMAT_VERSION};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Payload error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),
    #[error("Unsupported artifact format version: {0}")]
    UnsupportedFormat(u32),
}

const CREATE_VERSES: &str = "CREATE TABLE IF NOT EXISTS verses (
    id INTEGER PRIMARY KEY,
    surah INTEGER NOT NULL,
    surah_name TEXT NOT NULL,
    ayah INTEGER NOT NULL,
    text TEXT NOT NULL,
    juz INTEGER
)";

const CREATE_SIMILARITY_CACHE: &str = "CREATE TABLE IF NOT EXISTS similarity_cache (
    threshold_key TEXT PRIMARY KEY,
    built_at TEXT NOT NULL,
    payload TEXT NOT NULL
)";

const CREATE_WORD_STATS: &str = "CREATE TABLE IF NOT EXISTS word_stats (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    built_at TEXT NOT NULL,
    payload TEXT NOT NULL
)";

/// Cache rows are keyed by the floor threshold at fixed precision.
fn threshold_key(threshold: f64) -> String {
    format!("{:.4}", threshold)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, DbError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ============================================================================
// Corpus
// ============================================================================

/// Load all verses in id order. A missing juz is read as subdivision 0.
pub fn load_verses(db_path: &Path) -> Result<Vec<Verse>, DbError> {
    let conn = Connection::open(db_path)?;

    let mut stmt = conn.prepare(
        "SELECT id, surah, surah_name, ayah, text, juz
         FROM verses
         ORDER BY id",
    )?;

    let mut verses = Vec::new();
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let juz: Option<u32> = row.get(5)?;
        verses.push(Verse {
            id: row.get(0)?,
            major: row.get(1)?,
            major_name: row.get(2)?,
            minor: row.get(3)?,
            text: row.get(4)?,
            subdivision: juz.unwrap_or(0),
        });
    }

    Ok(verses)
}

/// Load the corpus and build its index.
pub fn load_corpus(db_path: &Path) -> Result<CorpusIndex, DbError> {
    let verses = load_verses(db_path)?;
    tracing::debug!(verses = verses.len(), path = %db_path.display(), "Loaded verses");
    Ok(CorpusIndex::new(verses)?)
}

/// Create the verses table if needed and insert or replace the given rows.
pub fn store_verses(db_path: &Path, verses: &[Verse]) -> Result<usize, DbError> {
    let mut conn = Connection::open(db_path)?;
    conn.execute(CREATE_VERSES, [])?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO verses (id, surah, surah_name, ayah, text, juz)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for verse in verses {
            stmt.execute(params![
                verse.id,
                verse.major,
                verse.major_name,
                verse.minor,
                verse.text,
                verse.subdivision
            ])?;
        }
    }
    tx.commit()?;

    Ok(verses.len())
}

// ============================================================================
// Similarity cache
// ============================================================================

/// Persist a snapshot, replacing any earlier build with the same threshold.
pub fn save_cache_snapshot(db_path: &Path, snapshot: &CacheSnapshot) -> Result<(), DbError> {
    let conn = Connection::open(db_path)?;
    conn.execute(CREATE_SIMILARITY_CACHE, [])?;

    let payload = serde_json::to_string(snapshot)?;
    conn.execute(
        "INSERT OR REPLACE INTO similarity_cache (threshold_key, built_at, payload)
         VALUES (?1, ?2, ?3)",
        params![
            threshold_key(snapshot.floor_threshold),
            snapshot.built_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            payload
        ],
    )?;

    tracing::info!(
        threshold = snapshot.floor_threshold,
        entries = snapshot.len(),
        bytes = payload.len(),
        "Saved similarity cache"
    );
    Ok(())
}

/// Load the snapshot built with `threshold`, or the most recent one.
pub fn load_cache_snapshot(
    db_path: &Path,
    threshold: Option<f64>,
) -> Result<Option<CacheSnapshot>, DbError> {
    let conn = Connection::open(db_path)?;
    if !table_exists(&conn, "similarity_cache")? {
        return Ok(None);
    }

    let payload: Option<String> = match threshold {
        Some(threshold) => conn
            .query_row(
                "SELECT payload FROM similarity_cache WHERE threshold_key = ?",
                [threshold_key(threshold)],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT payload FROM similarity_cache ORDER BY built_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?,
    };

    let Some(payload) = payload else {
        return Ok(None);
    };

    let snapshot: CacheSnapshot = serde_json::from_str(&payload)?;
    if snapshot.format_version != CACHE_FORMAT_VERSION {
        return Err(DbError::UnsupportedFormat(snapshot.format_version));
    }
    Ok(Some(snapshot))
}

/// Thresholds with a stored snapshot, with their build times.
pub fn list_cache_snapshots(db_path: &Path) -> Result<Vec<(String, String)>, DbError> {
    let conn = Connection::open(db_path)?;
    if !table_exists(&conn, "similarity_cache")? {
        return Ok(Vec::new());
    }

    let mut stmt =
        conn.prepare("SELECT threshold_key, built_at FROM similarity_cache ORDER BY threshold_key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// ============================================================================
// Word statistics
// ============================================================================

pub fn save_word_stats(db_path: &Path, stats: &WordStats) -> Result<(), DbError> {
    let conn = Connection::open(db_path)?;
    conn.execute(CREATE_WORD_STATS, [])?;

    let payload = serde_json::to_string(stats)?;
    conn.execute(
        "INSERT OR REPLACE INTO word_stats (id, built_at, payload) VALUES (1, ?1, ?2)",
        params![
            stats.built_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            payload
        ],
    )?;

    tracing::info!(words = stats.words.len(), bytes = payload.len(), "Saved word statistics");
    Ok(())
}

pub fn load_word_stats(db_path: &Path) -> Result<Option<WordStats>, DbError> {
    let conn = Connection::open(db_path)?;
    if !table_exists(&conn, "word_stats")? {
        return Ok(None);
    }

    let payload: Option<String> = conn
        .query_row("SELECT payload FROM word_stats WHERE id = 1", [], |row| row.get(0))
        .optional()?;

    let Some(payload) = payload else {
        return Ok(None);
    };

    let stats: WordStats = serde_json::from_str(&payload)?;
    if stats.format_version != WORD_STATS_FORMAT_VERSION {
        return Err(DbError::UnsupportedFormat(stats.format_version));
    }
    Ok(Some(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CachedNeighbor, NeighborCacheEntry};
    use chrono::{TimeZone, Utc};

    fn verses() -> Vec<Verse> {
        vec![
            Verse {
                id: 2,
                major: 1,
                major_name: "الفاتحة".to_string(),
                minor: 2,
                text: "الْحَمْدُ لِلَّهِ رَبِّ الْعَالَمِينَ".to_string(),
                subdivision: 1,
            },
            Verse {
                id: 1,
                major: 1,
                major_name: "الفاتحة".to_string(),
                minor: 1,
                text: "بِسْمِ اللَّهِ الرَّحْمَٰنِ الرَّحِيمِ".to_string(),
                subdivision: 1,
            },
        ]
    }

    fn snapshot(threshold: f64, second: u32) -> CacheSnapshot {
        CacheSnapshot {
            format_version: CACHE_FORMAT_VERSION,
            built_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap(),
            floor_threshold: threshold,
            max_neighbors: 50,
            near_duplicate_ceiling: 0.99,
            verse_count: 2,
            entries: vec![
                NeighborCacheEntry {
                    verse_id: 1,
                    neighbors: vec![CachedNeighbor {
                        verse_id: 2,
                        score: 2.0 / 7.0,
                    }],
                },
                NeighborCacheEntry {
                    verse_id: 2,
                    neighbors: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_verses_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");

        assert_eq!(store_verses(&path, &verses()).unwrap(), 2);
        let loaded = load_verses(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, 1);
        assert_eq!(loaded[1].text, verses()[0].text);

        let corpus = load_corpus(&path).unwrap();
        assert_eq!(corpus.by_id(2).unwrap().minor, 2);
    }

    #[test]
    fn test_empty_verses_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");
        store_verses(&path, &[]).unwrap();
        assert!(matches!(load_corpus(&path), Err(DbError::Corpus(CorpusError::Empty))));
    }

    #[test]
    fn test_cache_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");

        assert!(load_cache_snapshot(&path, None).unwrap().is_none());

        let original = snapshot(0.1, 0);
        save_cache_snapshot(&path, &original).unwrap();
        assert_eq!(load_cache_snapshot(&path, Some(0.1)).unwrap(), Some(original));
        assert!(load_cache_snapshot(&path, Some(0.5)).unwrap().is_none());
    }

    #[test]
    fn test_latest_snapshot_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");

        save_cache_snapshot(&path, &snapshot(0.3, 30)).unwrap();
        save_cache_snapshot(&path, &snapshot(0.1, 10)).unwrap();

        let latest = load_cache_snapshot(&path, None).unwrap().unwrap();
        assert_eq!(latest.floor_threshold, 0.3);
        assert_eq!(list_cache_snapshots(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");

        let mut future = snapshot(0.1, 0);
        future.format_version = CACHE_FORMAT_VERSION + 1;
        save_cache_snapshot(&path, &future).unwrap();

        assert!(matches!(
            load_cache_snapshot(&path, Some(0.1)),
            Err(DbError::UnsupportedFormat(v)) if v == CACHE_FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn test_word_stats_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");
        assert!(load_word_stats(&path).unwrap().is_none());

        let corpus = CorpusIndex::new(verses()).unwrap();
        let stats = crate::wordstats::build_word_stats(&corpus, &Default::default());
        save_word_stats(&path, &stats).unwrap();
        assert_eq!(load_word_stats(&path).unwrap(), Some(stats));
    }
}
