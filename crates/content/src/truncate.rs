//! Character-ceiling truncation for processed text.

/// Appended to any text cut at the configured character ceiling.
pub const TRUNCATION_MARKER: &str = "\n\n... [Content truncated at configured limit] ...";

/// Caps `text` at `max_chars` characters (Unicode scalar values, not bytes).
///
/// Text at or under the ceiling is returned untouched. Longer text is cut to
/// exactly `max_chars` characters and [`TRUNCATION_MARKER`] is appended. The
/// returned flag reports whether a cut happened.
///
/// # Examples
///
/// ```rust
/// use zimr_content::{TRUNCATION_MARKER, truncate_chars};
/// let (text, truncated) = truncate_chars("héllo wörld".to_string(), 5);
/// assert!(truncated);
/// assert_eq!(text, format!("héllo{TRUNCATION_MARKER}"));
/// assert_eq!(truncate_chars("short".to_string(), 5), ("short".to_string(), false));
/// ```
pub fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        None => (text, false),
        Some((cut, _)) => {
            let mut text = text;
            text.truncate(cut);
            text.push_str(TRUNCATION_MARKER);
            (text, true)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn no_truncation_needed() {
        let (text, truncated) = truncate_chars("abc".to_string(), 100);
        assert_eq!(text, "abc");
        assert!(!truncated);
    }

    #[rstest]
    #[case(1)]
    #[case(10)]
    #[case(999)]
    fn exact_length_after_cut(#[case] ceiling: usize) {
        let input = "x".repeat(ceiling * 3 + 1);
        let (text, truncated) = truncate_chars(input, ceiling);
        assert!(truncated);
        assert_eq!(text.chars().count(), ceiling + TRUNCATION_MARKER.chars().count());
        assert!(text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn counts_characters_not_bytes() {
        // Four characters, twelve bytes.
        let (text, truncated) = truncate_chars("日本語版".to_string(), 3);
        assert!(truncated);
        assert!(text.starts_with("日本語\n"));
    }

    #[test]
    fn boundary_is_inclusive() {
        let (text, truncated) = truncate_chars("12345".to_string(), 5);
        assert_eq!(text, "12345");
        assert!(!truncated);
    }

    #[test]
    fn zero_ceiling() {
        let (text, truncated) = truncate_chars("a".to_string(), 0);
        assert_eq!(text, TRUNCATION_MARKER);
        assert!(truncated);
    }
}
