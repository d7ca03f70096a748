//! Arabic text normalization for comparison.
//!
//! Every comparison in the crate runs on normalized text: vowel signs and
//! Quranic annotation marks are stripped, hamza-carrying alef forms and
//! word-final soft letters are folded to one canonical letter, tatweel is
//! dropped and whitespace is collapsed. The result is stable under repeated
//! application.

const TATWEEL: char = '\u{0640}';

/// Returns true for combining marks removed before comparison
/// (harakat, shadda, sukun, superscript alef and Quranic annotation signs).
#[inline]
pub fn is_diacritic(c: char) -> bool {
    matches!(
        c,
        '\u{0610}'..='\u{061A}'
            | '\u{064B}'..='\u{065F}'
            | '\u{0670}'
            | '\u{06D6}'..='\u{06DC}'
            | '\u{06DF}'..='\u{06E8}'
            | '\u{06EA}'..='\u{06ED}'
    )
}

/// Map a letter to the canonical member of its equivalence class.
#[inline]
pub fn fold_letter(c: char) -> char {
    match c {
        // أ إ آ ٱ -> ا
        '\u{0623}' | '\u{0625}' | '\u{0622}' | '\u{0671}' => '\u{0627}',
        // ى -> ي
        '\u{0649}' => '\u{064A}',
        // ة -> ه
        '\u{0629}' => '\u{0647}',
        other => other,
    }
}

/// Normalize raw script for comparison.
///
/// Empty input yields an empty string. Only whitespace collapsing can change
/// the number of whitespace-separated tokens.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if is_diacritic(c) || c == TATWEEL {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(fold_letter(c));
    }

    out
}

/// Split already-normalized text into word tokens.
pub fn words(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|w| !w.is_empty()).collect()
}

/// Normalize and tokenize in one step.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    words(&normalized).into_iter().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASMALA_VOCALIZED: &str = "بِسْمِ اللَّهِ الرَّحْمَٰنِ الرَّحِيمِ";

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(normalize(BASMALA_VOCALIZED), "بسم الله الرحمن الرحيم");
    }

    #[test]
    fn test_folds_hamza_forms() {
        assert_eq!(normalize("أحد"), "احد");
        assert_eq!(normalize("إن"), "ان");
        assert_eq!(normalize("آمنوا"), "امنوا");
        assert_eq!(normalize("ٱلله"), "الله");
    }

    #[test]
    fn test_folds_final_soft_letters() {
        assert_eq!(normalize("موسى"), "موسي");
        assert_eq!(normalize("الصلاة"), "الصلاه");
    }

    #[test]
    fn test_removes_tatweel() {
        assert_eq!(normalize("الرحـــمن"), "الرحمن");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize("  قل   هو\tالله \n احد  "), "قل هو الله احد");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_plain_text_unchanged() {
        let plain = "والعصر ان الانسان لفي خسر";
        assert_eq!(normalize(plain), plain);
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            BASMALA_VOCALIZED,
            "قُلْ هُوَ اللَّهُ أَحَدٌ",
            "فَبِأَيِّ آلَاءِ رَبِّكُمَا تُكَذِّبَانِ",
            "  ٱلْحَمْدُ   لِلَّهِ  ",
            "",
            "abc  def",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_token_count_preserved() {
        let text = "قُلْ هُوَ اللَّهُ أَحَدٌ";
        assert_eq!(tokenize(text).len(), text.split_whitespace().count());
    }

    #[test]
    fn test_words_on_empty() {
        assert!(words("").is_empty());
        assert!(tokenize("").is_empty());
    }
}
