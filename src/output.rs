//! Output formatting for query results (JSON, CSV, terminal).

use crate::corpus::CorpusIndex;
use crate::models::{
    AllPairsResult, CorpusStats, NeighborsResult, SampleResult, SimilarPair, Verse, WordStat,
    WordSuggestion,
};
use crate::score::{DiffOp, DiffSegment};
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write a pair query result as JSON.
pub fn write_pairs_json<W: Write>(result: &AllPairsResult, writer: &mut W) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(result)?;
    writer.write_all(json.as_bytes())?;
    Ok(())
}

/// Write a pair query result as JSON to a file.
pub fn write_pairs_json_file(result: &AllPairsResult, path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_pairs_json(result, &mut file)
}

/// Write a neighbor query result as JSON.
pub fn write_neighbors_json<W: Write>(
    result: &NeighborsResult,
    writer: &mut W,
) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(result)?;
    writer.write_all(json.as_bytes())?;
    Ok(())
}

/// Write a random sample as JSON.
pub fn write_sample_json<W: Write>(result: &SampleResult, writer: &mut W) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(result)?;
    writer.write_all(json.as_bytes())?;
    Ok(())
}

/// Write pairs as CSV.
pub fn write_pairs_csv<W: Write>(pairs: &[SimilarPair], writer: &mut W) -> Result<(), OutputError> {
    writeln!(
        writer,
        "verse_a_id,verse_a_location,verse_a_text,verse_b_id,verse_b_location,verse_b_text,\
         score,score_percent"
    )?;

    for pair in pairs {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{}",
            pair.verse_a.id,
            pair.verse_a.location(),
            csv_field(&pair.verse_a.text),
            pair.verse_b.id,
            pair.verse_b.location(),
            csv_field(&pair.verse_b.text),
            pair.score,
            pair.score_percent
        )?;
    }

    Ok(())
}

/// Write pairs as CSV to a file.
pub fn write_pairs_csv_file(pairs: &[SimilarPair], path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_pairs_csv(pairs, &mut file)
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ============================================================================
// Terminal output
// ============================================================================

fn format_verse(verse: &Verse) -> String {
    format!("[{}] {} {}", verse.id, verse.major_name, verse.location())
}

/// Format a pair as a human-readable string.
pub fn format_pair(pair: &SimilarPair) -> String {
    format!(
        "{:.1}%  {} ↔ {}\n\
         \x20 A: {}\n\
         \x20 B: {}",
        pair.score * 100.0,
        format_verse(&pair.verse_a),
        format_verse(&pair.verse_b),
        truncate_text(&pair.verse_a.text, 100),
        truncate_text(&pair.verse_b.text, 100),
    )
}

/// Print pairs in a human-readable format.
pub fn print_pairs(pairs: &[SimilarPair], limit: Option<usize>) {
    let to_print = match limit {
        Some(n) => &pairs[..n.min(pairs.len())],
        None => pairs,
    };

    for pair in to_print {
        println!("{}", format_pair(pair));
    }

    if let Some(n) = limit {
        if pairs.len() > n {
            println!("... and {} more pairs", pairs.len() - n);
        }
    }
}

/// Write a summary of a pair query to stdout.
pub fn print_pairs_summary(result: &AllPairsResult) {
    println!("\n=== Similar Pairs ===");
    println!("Version: {}", result.version);
    println!("Target: {}", result.target_scope);
    println!("Compare: {}", result.compare_scope);
    println!("Min similarity: {:.1}%", result.min_similarity * 100.0);
    println!("Method: {}", result.method);
    println!("Pairs found: {} ({} ms)", result.pairs.len(), result.elapsed_ms);
}

/// Print the neighbors of a verse.
pub fn print_neighbors(result: &NeighborsResult) {
    println!("\n{}", format_verse(&result.verse));
    println!("  {}", result.verse.text);
    println!("Method: {}  Found: {}\n", result.method, result.neighbors.len());

    for (rank, neighbor) in result.neighbors.iter().enumerate() {
        println!(
            "{:>3}. {:.1}%  {}",
            rank + 1,
            neighbor.score * 100.0,
            format_verse(&neighbor.verse)
        );
        println!("     {}", truncate_text(&neighbor.verse.text, 100));
    }
}

/// Print one verse with its location.
pub fn print_verse(verse: &Verse) {
    println!("{}", format_verse(verse));
    println!("  {}", verse.text);
}

pub fn print_sample(result: &SampleResult) {
    println!(
        "\n=== {} verses with neighbors >= {:.1}% ({}, {} ms) ===\n",
        result.verses.len(),
        result.min_similarity * 100.0,
        result.method,
        result.elapsed_ms
    );
    for verse in &result.verses {
        println!("{}", format_verse(verse));
        println!("  {}", truncate_text(&verse.text, 100));
    }
}

/// Print statistics for a word, listing at most `limit` verses by count.
pub fn print_word_stat(stat: &WordStat, corpus: &CorpusIndex, limit: usize) {
    println!("\n=== Word: {} ===", stat.word);
    println!("Total occurrences: {}", stat.total_count);
    println!("Verses: {}", stat.verse_count);

    println!("\nBy major division:");
    for entry in stat.by_major.iter().take(10) {
        println!("  {} ({}): {}", entry.major_name, entry.major, entry.count);
    }
    if stat.by_major.len() > 10 {
        println!("  ... and {} more", stat.by_major.len() - 10);
    }

    println!("\nBy subdivision:");
    for entry in stat.by_subdivision.iter().take(10) {
        println!("  {}: {}", entry.subdivision, entry.count);
    }

    let mut occurrences = stat.occurrences.clone();
    occurrences.sort_by(|a, b| b.count.cmp(&a.count).then(a.verse_id.cmp(&b.verse_id)));

    println!("\nVerses:");
    for occurrence in occurrences.iter().take(limit) {
        match corpus.by_id(occurrence.verse_id) {
            Some(verse) => println!(
                "  x{}  {}  {}",
                occurrence.count,
                format_verse(verse),
                truncate_text(&verse.text, 80)
            ),
            None => println!("  x{}  [{}]", occurrence.count, occurrence.verse_id),
        }
    }
    if occurrences.len() > limit {
        println!("  ... and {} more verses", occurrences.len() - limit);
    }
}

pub fn print_suggestions(prefix: &str, suggestions: &[WordSuggestion]) {
    println!("Suggestions for '{}':", prefix);
    for s in suggestions {
        println!("  {}  ({} occurrences, {} verses)", s.word, s.total_count, s.verse_count);
    }
    if suggestions.is_empty() {
        println!("  (none)");
    }
}

/// Render a word diff with bracketed changes, e.g. `قل هو [-احد-]{+الصمد+}`.
pub fn format_diff(segments: &[DiffSegment]) -> String {
    segments
        .iter()
        .map(|segment| {
            let a = segment.a_words.join(" ");
            let b = segment.b_words.join(" ");
            match segment.op {
                DiffOp::Equal => a,
                DiffOp::Delete => format!("[-{}-]", a),
                DiffOp::Insert => format!("{{+{}+}}", b),
                DiffOp::Replace => format!("[-{}-]{{+{}+}}", a, b),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Print a side-by-side comparison of two verses.
pub fn print_comparison(verse_a: &Verse, verse_b: &Verse, score: f64, segments: &[DiffSegment]) {
    println!("\n=== Comparison ===");
    println!("A: {}", format_verse(verse_a));
    println!("   {}", verse_a.text);
    println!("B: {}", format_verse(verse_b));
    println!("   {}", verse_b.text);
    println!("\nSimilarity: {:.1}%", score * 100.0);
    println!("Diff: {}", format_diff(segments));
}

pub fn print_stats(stats: &CorpusStats) {
    println!("\n=== Corpus Statistics ===");
    println!("Verses: {}", stats.total_verses);
    println!("Major divisions: {}", stats.total_majors);
    println!("Subdivisions: {}", stats.total_subdivisions);
    println!("Vocabulary: {}", stats.vocabulary_size);
    println!();
    match stats.cache_floor_threshold {
        Some(threshold) => {
            println!("Cache: {} entries, {} links", stats.cache_entries, stats.cache_links);
            println!("  Floor threshold: {:.2}", threshold);
            println!("  Generation: {}", stats.cache_generation);
        }
        None => println!("Cache: not loaded"),
    }
    match stats.word_stats_entries {
        Some(words) => println!("Word statistics: {} words", words),
        None => println!("Word statistics: not loaded"),
    }
}

/// Truncate text to a maximum length, adding ellipsis if needed.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchMethod;
    use crate::score::word_diff;

    fn verse(id: u32, text: &str) -> Verse {
        Verse {
            id,
            major: 112,
            major_name: "الإخلاص".to_string(),
            minor: id,
            text: text.to_string(),
            subdivision: 30,
        }
    }

    fn sample_result() -> AllPairsResult {
        AllPairsResult {
            version: "0.1.0".to_string(),
            target_scope: "whole corpus".to_string(),
            compare_scope: "whole corpus".to_string(),
            min_similarity: 0.7,
            method: MatchMethod::BruteForce,
            elapsed_ms: 3,
            pairs: vec![SimilarPair::new(
                &verse(2, "قل هو الله أحد"),
                &verse(1, "قل هو الله احد, \"الصمد\""),
                0.75,
            )],
        }
    }

    #[test]
    fn test_csv_output() {
        let result = sample_result();
        let mut buf = Vec::new();
        write_pairs_csv(&result.pairs, &mut buf).unwrap();
        let csv = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("verse_a_id,"));
        assert!(lines[1].starts_with("1,112:1,\"قل هو الله احد, \"\"الصمد\"\"\",2,112:2,"));
        assert!(lines[1].ends_with(",0.75,75"));
    }

    #[test]
    fn test_sample_json_output() {
        let result = SampleResult {
            min_similarity: 0.85,
            method: MatchMethod::CacheAccelerated,
            elapsed_ms: 1,
            verses: vec![verse(1, "قل هو الله احد")],
        };
        let mut buf = Vec::new();
        write_sample_json(&result, &mut buf).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["method"], "cache_accelerated");
        assert_eq!(value["verses"][0]["minor"], 1);
    }

    #[test]
    fn test_json_output() {
        let result = sample_result();
        let mut buf = Vec::new();
        write_pairs_json(&result, &mut buf).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["method"], "brute_force");
        assert_eq!(value["pairs"][0]["verse_a"]["id"], 1);
        assert_eq!(value["pairs"][0]["score_percent"], 75);
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_format_diff() {
        let segments = word_diff("قل هو الله احد", "قل هو الله الصمد");
        assert_eq!(format_diff(&segments), "قل هو الله [-احد-]{+الصمد+}");

        let segments = word_diff("ا ب ج", "ا ج");
        assert_eq!(format_diff(&segments), "ا [-ب-] ج");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate_text("الرحمن الرحيم", 6), "الر...");
    }
}
