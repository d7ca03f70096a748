//! Exclusion of formulaic near-duplicates.
//!
//! Some passages recur verbatim across the corpus: the opening formula at
//! the head of most major divisions and a handful of refrains. Exact matches
//! between such passages are true but uninteresting, so they are dropped from
//! near-duplicate results.

use crate::config::ExclusionConfig;
use crate::models::Verse;
use crate::normalize::normalize;
use crate::score::word_similarity;

/// Decides which matches are formulaic. Phrases are normalized once at
/// construction.
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    boilerplate: Vec<String>,
    openings: Vec<String>,
    exempt_majors: Vec<u32>,
    ceiling: f64,
}

impl ExclusionPolicy {
    pub fn new(config: &ExclusionConfig) -> Self {
        let normalize_all = |phrases: &[String]| {
            let mut out: Vec<String> = phrases
                .iter()
                .map(|p| normalize(p))
                .filter(|p| !p.is_empty())
                .collect();
            out.sort();
            out.dedup();
            out
        };

        ExclusionPolicy {
            boilerplate: normalize_all(&config.boilerplate_phrases),
            openings: normalize_all(&config.opening_phrases),
            exempt_majors: config.opening_exempt_majors.clone(),
            ceiling: config.near_duplicate_ceiling,
        }
    }

    /// Scores at or above this value count as near-duplicates.
    pub fn near_duplicate_ceiling(&self) -> f64 {
        self.ceiling
    }

    /// True when two texts are an exact (normalized) repetition of a
    /// boilerplate phrase or of the opening formula.
    pub fn is_excluded_exact_match(&self, text_a: &str, text_b: &str) -> bool {
        let score = word_similarity(text_a, text_b);
        if score < self.ceiling {
            return false;
        }
        self.is_excluded_normalized(&normalize(text_a), &normalize(text_b), score)
    }

    /// Same rule for callers that already hold normalized texts and their score.
    pub fn is_excluded_normalized(&self, norm_a: &str, norm_b: &str, score: f64) -> bool {
        if score < self.ceiling || norm_a != norm_b {
            return false;
        }
        self.contains_boilerplate(norm_a)
            || self.contains_boilerplate(norm_b)
            || self.opening_in_normalized(norm_a)
            || self.opening_in_normalized(norm_b)
    }

    /// Does normalized text contain one of the boilerplate phrases?
    pub fn contains_boilerplate(&self, normalized: &str) -> bool {
        self.boilerplate.iter().any(|p| normalized.contains(p.as_str()))
    }

    /// Does the text contain a variant of the opening formula?
    pub fn contains_opening_phrase(&self, text: &str) -> bool {
        self.opening_in_normalized(&normalize(text))
    }

    /// True for the first verse of a division when it is (or starts with)
    /// the opening formula. Exempt divisions never qualify.
    pub fn is_boilerplate_opening(&self, verse: &Verse) -> bool {
        if verse.minor != 1 || self.exempt_majors.contains(&verse.major) {
            return false;
        }
        self.contains_opening_phrase(&verse.text)
    }

    fn opening_in_normalized(&self, normalized: &str) -> bool {
        self.openings.iter().any(|opening| {
            normalized == opening
                || normalized.starts_with(opening.as_str())
                || normalized.contains(opening.as_str())
        })
    }
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::new(&ExclusionConfig::default())
    }
}
