//! Word frequency statistics.
//!
//! One accumulation pass over the corpus produces a record per normalized
//! word: total occurrences, distinct verses, and breakdowns by major division
//! and subdivision. Records are kept sorted by word so lookups are a binary
//! search and prefix queries scan one contiguous range.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;

use crate::config::WordStatsParams;
use crate::corpus::CorpusIndex;
use crate::models::*;
use crate::normalize::{normalize, words};

#[derive(Default)]
struct WordAccumulator {
    total_count: u32,
    occurrences: Vec<WordOccurrence>,
    by_major: BTreeMap<u32, (String, u32)>,
    by_subdivision: BTreeMap<u32, u32>,
}

impl WordAccumulator {
    fn finish(self, word: String) -> WordStat {
        let mut by_major: Vec<MajorCount> = self
            .by_major
            .into_iter()
            .map(|(major, (major_name, count))| MajorCount {
                major,
                major_name,
                count,
            })
            .collect();
        by_major.sort_by(|a, b| b.count.cmp(&a.count).then(a.major.cmp(&b.major)));

        let mut by_subdivision: Vec<SubdivisionCount> = self
            .by_subdivision
            .into_iter()
            .map(|(subdivision, count)| SubdivisionCount { subdivision, count })
            .collect();
        by_subdivision.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.subdivision.cmp(&b.subdivision))
        });

        WordStat {
            word,
            total_count: self.total_count,
            verse_count: self.occurrences.len() as u32,
            occurrences: self.occurrences,
            by_major,
            by_subdivision,
        }
    }
}

/// Build word statistics for the whole corpus.
pub fn build_word_stats(corpus: &CorpusIndex, params: &WordStatsParams) -> WordStats {
    let stoplist: HashSet<String> = params.stoplist.iter().map(|w| normalize(w)).collect();
    let mut accumulators: BTreeMap<String, WordAccumulator> = BTreeMap::new();

    for verse in corpus.all() {
        let normalized = normalize(&verse.text);

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for word in words(&normalized) {
            if word.chars().count() < params.min_word_chars || stoplist.contains(word) {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }

        for (word, count) in counts {
            let acc = accumulators.entry(word.to_string()).or_default();
            acc.total_count += count;
            acc.occurrences.push(WordOccurrence {
                verse_id: verse.id,
                count,
            });
            let major = acc
                .by_major
                .entry(verse.major)
                .or_insert_with(|| (verse.major_name.clone(), 0));
            major.1 += count;
            *acc.by_subdivision.entry(verse.subdivision).or_insert(0) += count;
        }
    }

    let words: Vec<WordStat> = accumulators
        .into_iter()
        .map(|(word, acc)| acc.finish(word))
        .collect();

    tracing::info!(words = words.len(), verses = corpus.len(), "Word statistics built");

    WordStats {
        format_version: WORD_STATS_FORMAT_VERSION,
        built_at: Utc::now(),
        verse_count: corpus.len(),
        words,
    }
}

impl WordStats {
    /// Statistics for a word. The query is normalized first.
    pub fn lookup(&self, word: &str) -> Option<&WordStat> {
        let key = normalize(word);
        if key.is_empty() {
            return None;
        }
        self.words
            .binary_search_by(|stat| stat.word.as_str().cmp(key.as_str()))
            .ok()
            .map(|idx| &self.words[idx])
    }

    /// Words starting with the normalized prefix, most frequent first.
    pub fn prefix_search(&self, prefix: &str, limit: usize) -> Vec<WordSuggestion> {
        let prefix = normalize(prefix);
        if prefix.is_empty() {
            return Vec::new();
        }

        let start = self.words.partition_point(|stat| stat.word.as_str() < prefix.as_str());
        let mut suggestions: Vec<WordSuggestion> = self.words[start..]
            .iter()
            .take_while(|stat| stat.word.starts_with(prefix.as_str()))
            .map(|stat| WordSuggestion {
                word: stat.word.clone(),
                total_count: stat.total_count,
                verse_count: stat.verse_count,
            })
            .collect();

        suggestions.sort_by(|a, b| b.total_count.cmp(&a.total_count).then_with(|| a.word.cmp(&b.word)));
        suggestions.truncate(limit);
        suggestions
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verse(id: u32, major: u32, subdivision: u32, text: &str) -> Verse {
        Verse {
            id,
            major,
            major_name: format!("سورة {}", major),
            minor: id,
            text: text.to_string(),
            subdivision,
        }
    }

    fn sample_stats() -> WordStats {
        let corpus = CorpusIndex::new(vec![
            verse(1, 1, 1, "الْحَمْدُ لِلَّهِ رَبِّ الْعَالَمِينَ"),
            verse(2, 1, 1, "الرَّحْمَٰنِ الرَّحِيمِ"),
            verse(3, 2, 2, "قل هو الله احد الله الصمد"),
            verse(4, 2, 3, "رب الناس ملك الناس اله الناس"),
        ])
        .unwrap();
        build_word_stats(&corpus, &WordStatsParams::default())
    }

    #[test]
    fn test_counts() {
        let stats = sample_stats();
        let nas = stats.lookup("الناس").unwrap();
        assert_eq!(nas.total_count, 3);
        assert_eq!(nas.verse_count, 1);
        assert_eq!(nas.occurrences, vec![WordOccurrence { verse_id: 4, count: 3 }]);

        let rabb = stats.lookup("رَبِّ").unwrap();
        assert_eq!(rabb.total_count, 2);
        assert_eq!(rabb.verse_count, 2);
        assert_eq!(rabb.occurrences[0].verse_id, 1);
        assert_eq!(rabb.occurrences[1].verse_id, 4);
    }

    #[test]
    fn test_breakdowns_sorted_by_count() {
        let stats = sample_stats();
        let rabb = stats.lookup("رب").unwrap();
        assert_eq!(rabb.by_major.len(), 2);
        assert_eq!(rabb.by_major[0].major, 1);
        assert_eq!(rabb.by_major[0].major_name, "سورة 1");

        let allah = stats.lookup("الله").unwrap();
        assert_eq!(allah.total_count, 2);
        assert_eq!(
            allah.by_subdivision,
            vec![SubdivisionCount {
                subdivision: 2,
                count: 2
            }]
        );
    }

    #[test]
    fn test_stoplist_and_short_words_skipped() {
        let stats = sample_stats();
        assert!(stats.lookup("قل").is_none());
        assert!(stats.lookup("هو").is_none());

        let corpus = CorpusIndex::new(vec![verse(1, 1, 1, "و ب قل")]).unwrap();
        let params = WordStatsParams {
            stoplist: vec![],
            min_word_chars: 1,
        };
        let stats = build_word_stats(&corpus, &params);
        assert_eq!(stats.len(), 3);
    }

    #[test]
    fn test_words_sorted_and_lookup_normalizes() {
        let stats = sample_stats();
        assert!(stats.words.windows(2).all(|w| w[0].word < w[1].word));
        assert!(stats.lookup("الرَّحْمَٰنِ").is_some());
        assert!(stats.lookup("").is_none());
        assert!(stats.lookup("غائب").is_none());
    }

    #[test]
    fn test_prefix_search() {
        let stats = sample_stats();
        let suggestions = stats.prefix_search("ال", 3);
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0].word, "الناس");
        assert_eq!(suggestions[0].total_count, 3);
        assert_eq!(suggestions[1].word, "الله");
        assert!(suggestions
            .windows(2)
            .all(|w| w[0].total_count > w[1].total_count
                || (w[0].total_count == w[1].total_count && w[0].word < w[1].word)));

        assert!(stats.prefix_search("", 10).is_empty());
        assert!(stats.prefix_search("زز", 10).is_empty());
    }
}
