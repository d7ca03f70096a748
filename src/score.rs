//! Word-level block-matching similarity.
//!
//! This is the HOT PATH - the cache builder calls it for every ordered pair
//! of verses in the corpus.
//!
//! The metric is a Ratcliff-Obershelp ratio over tokens: find the longest
//! common contiguous block, recurse on the remainders to its left and right,
//! and score `2 * matched / (len_a + len_b)`. Ties between equally long blocks
//! go to the earliest block in `a`, then the earliest in `b`.

use serde::{Deserialize, Serialize};

use crate::normalize::{normalize, words};

/// Granularity of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonUnit {
    /// Whitespace-separated words (used for all corpus comparisons)
    #[default]
    Words,
    /// Unicode scalar values of the normalized text
    Chars,
}

/// A maximal common run: `a[a..a + size] == b[b..b + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchBlock {
    pub a: usize,
    pub b: usize,
    pub size: usize,
}

/// Reusable scratch space for block matching.
///
/// Keeping one matcher per worker avoids reallocating the DP rows for
/// each of the millions of comparisons a cache build performs.
#[derive(Debug, Default)]
pub struct BlockMatcher {
    prev: Vec<usize>,
    curr: Vec<usize>,
    queue: Vec<(usize, usize, usize, usize)>,
}

impl BlockMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Similarity ratio in `[0, 1]`.
    ///
    /// The pair is put in lexicographic order before matching, so
    /// `ratio(a, b) == ratio(b, a)` bit for bit.
    #[inline]
    pub fn ratio<T: Ord>(&mut self, a: &[T], b: &[T]) -> f64 {
        let total = a.len() + b.len();
        if total == 0 {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        let matched = self.matched_len(a, b);
        2.0 * matched as f64 / total as f64
    }

    /// Total length of all matching blocks.
    pub fn matched_len<T: Eq>(&mut self, a: &[T], b: &[T]) -> usize {
        let mut matched = 0;
        self.queue.clear();
        self.queue.push((0, a.len(), 0, b.len()));

        while let Some((a_lo, a_hi, b_lo, b_hi)) = self.queue.pop() {
            if let Some(block) = self.longest_match(a, b, a_lo, a_hi, b_lo, b_hi) {
                matched += block.size;
                self.push_remainders(block, a_lo, a_hi, b_lo, b_hi);
            }
        }

        matched
    }

    /// All matching blocks, ordered by position.
    pub fn matching_blocks<T: Eq>(&mut self, a: &[T], b: &[T]) -> Vec<MatchBlock> {
        let mut blocks = Vec::new();
        self.queue.clear();
        self.queue.push((0, a.len(), 0, b.len()));

        while let Some((a_lo, a_hi, b_lo, b_hi)) = self.queue.pop() {
            if let Some(block) = self.longest_match(a, b, a_lo, a_hi, b_lo, b_hi) {
                self.push_remainders(block, a_lo, a_hi, b_lo, b_hi);
                blocks.push(block);
            }
        }

        blocks.sort_unstable();
        blocks
    }

    #[inline]
    fn push_remainders(
        &mut self,
        block: MatchBlock,
        a_lo: usize,
        a_hi: usize,
        b_lo: usize,
        b_hi: usize,
    ) {
        if a_lo < block.a && b_lo < block.b {
            self.queue.push((a_lo, block.a, b_lo, block.b));
        }
        let a_end = block.a + block.size;
        let b_end = block.b + block.size;
        if a_end < a_hi && b_end < b_hi {
            self.queue.push((a_end, a_hi, b_end, b_hi));
        }
    }

    /// Longest common block inside `a[a_lo..a_hi]` x `b[b_lo..b_hi]`.
    ///
    /// `prev[j]`/`curr[j]` hold the length of the common suffix ending at
    /// `(i, b_lo + j - 1)`; column 0 is a permanent zero sentinel.
    fn longest_match<T: Eq>(
        &mut self,
        a: &[T],
        b: &[T],
        a_lo: usize,
        a_hi: usize,
        b_lo: usize,
        b_hi: usize,
    ) -> Option<MatchBlock> {
        if a_lo >= a_hi || b_lo >= b_hi {
            return None;
        }

        let width = b_hi - b_lo + 1;
        self.prev.clear();
        self.prev.resize(width, 0);
        self.curr.clear();
        self.curr.resize(width, 0);

        let mut best = MatchBlock {
            a: a_lo,
            b: b_lo,
            size: 0,
        };

        for i in a_lo..a_hi {
            let token_a = &a[i];
            for j in b_lo..b_hi {
                let col = j - b_lo + 1;
                if *token_a == b[j] {
                    let k = self.prev[col - 1] + 1;
                    self.curr[col] = k;
                    if k > best.size {
                        best = MatchBlock {
                            a: i + 1 - k,
                            b: j + 1 - k,
                            size: k,
                        };
                    }
                } else {
                    self.curr[col] = 0;
                }
            }
            std::mem::swap(&mut self.prev, &mut self.curr);
        }

        (best.size > 0).then_some(best)
    }
}

/// Similarity of two texts in `[0, 1]`.
///
/// Both inputs are normalized first. Two empty texts score 1.0; exactly one
/// empty text scores 0.0.
pub fn score(text_a: &str, text_b: &str, unit: ComparisonUnit) -> f64 {
    let norm_a = normalize(text_a);
    let norm_b = normalize(text_b);
    let mut matcher = BlockMatcher::new();

    match unit {
        ComparisonUnit::Words => matcher.ratio(&words(&norm_a), &words(&norm_b)),
        ComparisonUnit::Chars => {
            let chars_a: Vec<char> = norm_a.chars().collect();
            let chars_b: Vec<char> = norm_b.chars().collect();
            matcher.ratio(&chars_a, &chars_b)
        }
    }
}

/// Word-mode similarity, the metric used for every corpus comparison.
#[inline]
pub fn word_similarity(text_a: &str, text_b: &str) -> f64 {
    score(text_a, text_b, ComparisonUnit::Words)
}

// ============================================================================
// Interned corpus tokens
// ============================================================================

/// Normalized, interned word sequences for a fixed list of texts.
///
/// Token ids are assigned in lexicographic order of the words, so comparing
/// two id sequences orders them exactly like the word sequences they stand
/// for. `ratio` on ids therefore returns the same value as [`score`] on the
/// original texts.
#[derive(Debug, Clone)]
pub struct TokenizedCorpus {
    vocabulary: Vec<String>,
    normalized: Vec<String>,
    sequences: Vec<Vec<u32>>,
}

impl TokenizedCorpus {
    pub fn from_texts<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let normalized: Vec<String> = texts.into_iter().map(normalize).collect();

        let mut vocabulary: Vec<String> = normalized
            .iter()
            .flat_map(|text| words(text))
            .map(str::to_owned)
            .collect();
        vocabulary.sort_unstable();
        vocabulary.dedup();

        let sequences = normalized
            .iter()
            .map(|text| {
                words(text)
                    .into_iter()
                    .map(|w| match vocabulary.binary_search_by(|v| v.as_str().cmp(w)) {
                        Ok(id) | Err(id) => id as u32,
                    })
                    .collect()
            })
            .collect();

        Self {
            vocabulary,
            normalized,
            sequences,
        }
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Number of distinct normalized words.
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn word(&self, token_id: u32) -> Option<&str> {
        self.vocabulary.get(token_id as usize).map(String::as_str)
    }

    pub fn sequence(&self, position: usize) -> &[u32] {
        &self.sequences[position]
    }

    pub fn normalized(&self, position: usize) -> &str {
        &self.normalized[position]
    }

    /// Word similarity between the texts at two positions.
    #[inline]
    pub fn ratio(&self, matcher: &mut BlockMatcher, pos_a: usize, pos_b: usize) -> f64 {
        matcher.ratio(&self.sequences[pos_a], &self.sequences[pos_b])
    }
}

// ============================================================================
// Word diff
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOp {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// One run of a word-level diff. `a_words` come from the first text,
/// `b_words` from the second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSegment {
    pub op: DiffOp,
    pub a_words: Vec<String>,
    pub b_words: Vec<String>,
}

/// Word-level diff of two texts after normalization.
pub fn word_diff(text_a: &str, text_b: &str) -> Vec<DiffSegment> {
    let norm_a = normalize(text_a);
    let norm_b = normalize(text_b);
    let a = words(&norm_a);
    let b = words(&norm_b);

    let mut blocks = BlockMatcher::new().matching_blocks(&a, &b);
    blocks.push(MatchBlock {
        a: a.len(),
        b: b.len(),
        size: 0,
    });

    let to_owned = |slice: &[&str]| slice.iter().map(|w| (*w).to_owned()).collect::<Vec<_>>();
    let mut segments: Vec<DiffSegment> = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);

    for block in blocks {
        let op = match (i < block.a, j < block.b) {
            (true, true) => Some(DiffOp::Replace),
            (true, false) => Some(DiffOp::Delete),
            (false, true) => Some(DiffOp::Insert),
            (false, false) => None,
        };
        if let Some(op) = op {
            segments.push(DiffSegment {
                op,
                a_words: to_owned(&a[i..block.a]),
                b_words: to_owned(&b[j..block.b]),
            });
        }

        if block.size > 0 {
            let a_run = &a[block.a..block.a + block.size];
            let b_run = &b[block.b..block.b + block.size];
            match segments.last_mut() {
                Some(last) if last.op == DiffOp::Equal => {
                    last.a_words.extend(a_run.iter().map(|w| (*w).to_owned()));
                    last.b_words.extend(b_run.iter().map(|w| (*w).to_owned()));
                }
                _ => segments.push(DiffSegment {
                    op: DiffOp::Equal,
                    a_words: to_owned(a_run),
                    b_words: to_owned(b_run),
                }),
            }
        }

        i = block.a + block.size;
        j = block.b + block.size;
    }

    segments
}
