use std::collections::{BTreeMap, BTreeSet};

use crate::config::CorrectConfig;

/// Outcome of validating one corrected batch against its original.
#[derive(Debug, Clone)]
pub struct Validation {
    pub is_valid: bool,
    /// Human-readable explanation, phrased so it can be fed back to the
    /// correction service as a retry instruction.
    pub feedback: String,
}

impl Validation {
    fn pass() -> Self {
        Self {
            is_valid: true,
            feedback: String::new(),
        }
    }

    fn fail(feedback: String) -> Self {
        Self {
            is_valid: false,
            feedback,
        }
    }
}

/// Validate a candidate batch: its position set must exactly match the
/// original's, and every text must stay within the configured similarity
/// floor of its original.
pub fn validate_batch(
    original: &BTreeMap<usize, String>,
    candidate: &BTreeMap<usize, String>,
    config: &CorrectConfig,
) -> Validation {
    let expected: BTreeSet<usize> = original.keys().copied().collect();
    let actual: BTreeSet<usize> = candidate.keys().copied().collect();

    if expected != actual {
        let missing: Vec<usize> = expected.difference(&actual).copied().collect();
        let extra: Vec<usize> = actual.difference(&expected).copied().collect();

        return Validation::fail(format!(
            "Missing keys: {:?}\nExtra keys: {:?}\nRequired keys: {:?}\n\
             Please return the COMPLETE corrected dictionary with ALL {} keys.",
            missing,
            extra,
            expected.iter().collect::<Vec<_>>(),
            expected.len()
        ));
    }

    let mut excessive_changes = Vec::new();
    for (position, original_text) in original {
        let candidate_text = candidate.get(position).map(String::as_str).unwrap_or("");

        let original_cleaned = normalize_whitespace(original_text);
        let candidate_cleaned = normalize_whitespace(candidate_text);

        let similarity = similarity_ratio(&original_cleaned, &candidate_cleaned);
        let threshold = config.similarity_threshold(count_words(original_text));

        if similarity < threshold {
            excessive_changes.push(format!(
                "Key '{}': similarity {:.1}% < {:.0}%. Original: '{}' -> Corrected: '{}'",
                position,
                similarity * 100.0,
                threshold * 100.0,
                original_text,
                candidate_text
            ));
        }
    }

    if !excessive_changes.is_empty() {
        let mut feedback = excessive_changes.join(";\n");
        feedback.push_str(
            "\n\nYour corrections changed the text too much. \
             Keep high similarity by making MINIMAL changes: \
             only fix recognition errors and improve clarity, \
             but preserve the original wording, length and structure as much as possible.",
        );
        return Validation::fail(feedback);
    }

    Validation::pass()
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character-level similarity ratio in 0..1 based on edit distance.
/// Two empty strings are identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }

    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Count words in a way that works for both spaced and unspaced scripts:
/// each character of a no-space script (CJK, kana, hangul, Thai, ...) counts
/// as one word; the rest of the text is counted by whitespace splitting.
pub fn count_words(text: &str) -> usize {
    let mut char_count = 0;
    let mut spaced = String::with_capacity(text.len());

    for ch in text.chars() {
        if is_no_space_script(ch) {
            char_count += 1;
            spaced.push(' ');
        } else {
            spaced.push(ch);
        }
    }

    char_count + spaced.split_whitespace().count()
}

fn is_no_space_script(ch: char) -> bool {
    matches!(ch,
        '\u{4e00}'..='\u{9fff}'   // CJK unified ideographs
        | '\u{3040}'..='\u{309f}' // Hiragana
        | '\u{30a0}'..='\u{30ff}' // Katakana
        | '\u{ac00}'..='\u{d7af}' // Hangul
        | '\u{0e00}'..='\u{0eff}' // Thai, Lao
        | '\u{1000}'..='\u{109f}' // Myanmar
        | '\u{1780}'..='\u{17ff}' // Khmer
        | '\u{0900}'..='\u{0dff}' // Indic scripts
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CorrectConfig {
        crate::config::Config::default().correct
    }

    fn batch(entries: &[(usize, &str)]) -> BTreeMap<usize, String> {
        entries.iter().map(|&(k, v)| (k, v.to_string())).collect()
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("Hello world"), 2);
        assert_eq!(count_words("It's a test-case"), 3);
        assert_eq!(count_words("日本語"), 3);
        assert_eq!(count_words("this is 日本語 text"), 6);
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abc", "abc"), 1.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
        let ratio = similarity_ratio("kitten", "sitting");
        assert!((ratio - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \t b\n c  "), "a b c");
    }

    #[test]
    fn test_minor_fixes_pass() {
        let original = batch(&[(1, "Hello wrld"), (2, "This is a tst")]);
        let candidate = batch(&[(1, "Hello world"), (2, "This is a test")]);

        let result = validate_batch(&original, &candidate, &config());
        assert!(result.is_valid, "feedback: {}", result.feedback);
    }

    #[test]
    fn test_extra_key_reported() {
        let original = batch(&[(1, "ok")]);
        let candidate = batch(&[(1, "ok"), (2, "extra")]);

        let result = validate_batch(&original, &candidate, &config());
        assert!(!result.is_valid);
        assert!(result.feedback.contains("Missing keys: []"));
        assert!(result.feedback.contains("Extra keys: [2]"));
        assert!(result.feedback.contains("Required keys"));
    }

    #[test]
    fn test_missing_and_extra_keys_reported() {
        let original = batch(&[(1, "a"), (2, "b")]);
        let candidate = batch(&[(2, "b"), (3, "c")]);

        let result = validate_batch(&original, &candidate, &config());
        assert!(!result.is_valid);
        assert!(result.feedback.contains("Missing keys: [1]"));
        assert!(result.feedback.contains("Extra keys: [3]"));
    }

    #[test]
    fn test_unrelated_long_text_fails() {
        let original = batch(&[(
            1,
            "the quick brown fox jumps over the lazy dog near the riverbank today",
        )]);
        let candidate = batch(&[(
            1,
            "completely different words having nothing in common with what was said before now",
        )]);

        let result = validate_batch(&original, &candidate, &config());
        assert!(!result.is_valid);
        assert!(result.feedback.contains("70%"));
        assert!(result.feedback.contains("Key '1'"));
    }

    #[test]
    fn test_short_text_tolerates_larger_change() {
        // 2 words, threshold 0.3: even a heavy rewrite passes
        let original = batch(&[(1, "teh dgo")]);
        let candidate = batch(&[(1, "the dog")]);

        let result = validate_batch(&original, &candidate, &config());
        assert!(result.is_valid);
    }
}
