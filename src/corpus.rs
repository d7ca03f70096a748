//! In-memory corpus index with scope filters.
//!
//! The index is built once and never mutated, so every read is lock-free
//! and the index can be shared across threads behind an `Arc`.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Verse;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CorpusError {
    #[error("Corpus is empty")]
    Empty,
    #[error("Duplicate verse id: {0}")]
    DuplicateId(u32),
    #[error("Duplicate verse position {major}:{minor}")]
    DuplicatePosition { major: u32, minor: u32 },
}

/// A named selection of verses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Whole,
    Major(u32),
    Subdivision(u32),
    /// Inclusive range of subdivisions
    SubdivisionRange(u32, u32),
    Ids(Vec<u32>),
}

impl Scope {
    /// One of the three canonical thirds of a 30-part subdivision scheme.
    pub fn third(n: u32) -> Option<Scope> {
        match n {
            1 => Some(Scope::SubdivisionRange(1, 10)),
            2 => Some(Scope::SubdivisionRange(11, 20)),
            3 => Some(Scope::SubdivisionRange(21, 30)),
            _ => None,
        }
    }

    pub fn is_whole(&self) -> bool {
        matches!(self, Scope::Whole)
    }

    /// Does a verse fall inside this scope?
    pub fn contains(&self, verse: &Verse) -> bool {
        match self {
            Scope::Whole => true,
            Scope::Major(id) => verse.major == *id,
            Scope::Subdivision(id) => verse.subdivision == *id,
            Scope::SubdivisionRange(lo, hi) => (*lo..=*hi).contains(&verse.subdivision),
            Scope::Ids(ids) => ids.contains(&verse.id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Whole => write!(f, "whole corpus"),
            Scope::Major(id) => write!(f, "major {}", id),
            Scope::Subdivision(id) => write!(f, "subdivision {}", id),
            Scope::SubdivisionRange(lo, hi) => write!(f, "subdivisions {}-{}", lo, hi),
            Scope::Ids(ids) => write!(f, "{} explicit verses", ids.len()),
        }
    }
}

/// Immutable table of verses in canonical (ascending id) order.
#[derive(Debug)]
pub struct CorpusIndex {
    verses: Vec<Verse>,
    positions: HashMap<u32, usize>,
    locations: HashMap<(u32, u32), usize>, // (major, minor) -> position
}

impl CorpusIndex {
    /// Build the index. Verses are reordered by id.
    pub fn new(mut verses: Vec<Verse>) -> Result<Self, CorpusError> {
        if verses.is_empty() {
            return Err(CorpusError::Empty);
        }

        verses.sort_by_key(|v| v.id);

        let mut positions = HashMap::with_capacity(verses.len());
        let mut locations = HashMap::with_capacity(verses.len());
        for (idx, verse) in verses.iter().enumerate() {
            if positions.insert(verse.id, idx).is_some() {
                return Err(CorpusError::DuplicateId(verse.id));
            }
            if locations.insert((verse.major, verse.minor), idx).is_some() {
                return Err(CorpusError::DuplicatePosition {
                    major: verse.major,
                    minor: verse.minor,
                });
            }
        }

        Ok(CorpusIndex {
            verses,
            positions,
            locations,
        })
    }

    pub fn all(&self) -> &[Verse] {
        &self.verses
    }

    pub fn len(&self) -> usize {
        self.verses.len()
    }

    /// Always false: construction rejects empty corpora.
    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    pub fn by_id(&self, id: u32) -> Option<&Verse> {
        self.positions.get(&id).map(|&idx| &self.verses[idx])
    }

    /// Look up a verse by its major division and number within it.
    pub fn by_position(&self, major: u32, minor: u32) -> Option<&Verse> {
        self.locations.get(&(major, minor)).map(|&idx| &self.verses[idx])
    }

    /// Position of a verse in canonical order.
    pub fn position(&self, id: u32) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn verse_at(&self, position: usize) -> &Verse {
        &self.verses[position]
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<&Verse>
    where
        P: Fn(&Verse) -> bool,
    {
        self.verses.iter().filter(|&v| predicate(v)).collect()
    }

    pub fn by_major(&self, major: u32) -> Vec<&Verse> {
        self.filter(|v| v.major == major)
    }

    pub fn by_subdivision(&self, subdivision: u32) -> Vec<&Verse> {
        self.filter(|v| v.subdivision == subdivision)
    }

    pub fn by_subdivision_range(&self, lo: u32, hi: u32) -> Vec<&Verse> {
        self.filter(|v| v.subdivision >= lo && v.subdivision <= hi)
    }

    /// Verses with the given ids, in canonical order. Unknown ids are skipped.
    pub fn by_ids(&self, ids: &[u32]) -> Vec<&Verse> {
        let mut positions: Vec<usize> = ids.iter().filter_map(|id| self.position(*id)).collect();
        positions.sort_unstable();
        positions.dedup();
        positions.into_iter().map(|idx| &self.verses[idx]).collect()
    }

    pub fn select(&self, scope: &Scope) -> Vec<&Verse> {
        match scope {
            Scope::Whole => self.verses.iter().collect(),
            Scope::Major(id) => self.by_major(*id),
            Scope::Subdivision(id) => self.by_subdivision(*id),
            Scope::SubdivisionRange(lo, hi) => self.by_subdivision_range(*lo, *hi),
            Scope::Ids(ids) => self.by_ids(ids),
        }
    }

    pub fn major_count(&self) -> usize {
        self.verses.iter().map(|v| v.major).collect::<HashSet<_>>().len()
    }

    pub fn subdivision_count(&self) -> usize {
        self.verses
            .iter()
            .map(|v| v.subdivision)
            .collect::<HashSet<_>>()
            .len()
    }
}
