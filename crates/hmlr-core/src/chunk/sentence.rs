//! Sentence boundary detection.
//!
//! Splits paragraph text into sentences on terminal punctuation while
//! avoiding common abbreviations, initials, and decimal numbers.

/// Abbreviations that end with a period but do not end a sentence
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "fig", "no",
    "approx",
];

/// Split a paragraph into sentences
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut start = 0;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '.' || c == '!' || c == '?' {
            if is_boundary(&chars, i) {
                let sentence: String = chars[start..=i].iter().collect();
                let trimmed = sentence.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                start = i + 1;
            }
        }
        i += 1;
    }

    let tail: String = chars[start..].iter().collect();
    let trimmed = tail.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

/// Whether the terminator at `idx` closes a sentence
fn is_boundary(chars: &[char], idx: usize) -> bool {
    let c = chars[idx];

    if c == '.' {
        // Decimal number: 3.14
        let prev_digit = idx > 0 && chars[idx - 1].is_ascii_digit();
        let next_digit = idx + 1 < chars.len() && chars[idx + 1].is_ascii_digit();
        if prev_digit && next_digit {
            return false;
        }

        // Single-letter initial: "J."
        if idx >= 1 && chars[idx - 1].is_alphabetic() {
            let standalone = idx < 2 || !chars[idx - 2].is_alphabetic();
            if standalone && chars[idx - 1].is_uppercase() {
                return false;
            }
        }

        if trailing_word_is_abbreviation(chars, idx) {
            return false;
        }
    }

    // Must be followed by end-of-text or whitespace
    match chars.get(idx + 1) {
        None => true,
        Some(next) => next.is_whitespace(),
    }
}

/// Whether the word ending at `idx` (exclusive of the period) is a known
/// abbreviation
fn trailing_word_is_abbreviation(chars: &[char], idx: usize) -> bool {
    let mut start = idx;
    while start > 0 {
        let c = chars[start - 1];
        if c.is_alphabetic() || c == '.' {
            start -= 1;
        } else {
            break;
        }
    }
    if start == idx {
        return false;
    }
    let word: String = chars[start..idx].iter().collect::<String>().to_lowercase();
    ABBREVIATIONS.contains(&word.trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_split() {
        let sentences = split_sentences("First sentence. Second sentence! Third?");
        assert_eq!(
            sentences,
            vec!["First sentence.", "Second sentence!", "Third?"]
        );
    }

    #[test]
    fn test_no_terminal_punctuation() {
        let sentences = split_sentences("a sentence without an ending");
        assert_eq!(sentences, vec!["a sentence without an ending"]);
    }

    #[test]
    fn test_decimal_not_split() {
        let sentences = split_sentences("The threshold is 0.4 by default. Tune it carefully.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("0.4"));
    }

    #[test]
    fn test_abbreviation_not_split() {
        let sentences = split_sentences("Dr. Smith rotated the key. The old one is dead.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].starts_with("Dr. Smith"));
    }

    #[test]
    fn test_empty_input() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }
}
