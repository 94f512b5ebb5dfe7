//! Text helpers for answer grading and reply scanning

use std::borrow::Cow;
use regex::Regex;
use lazy_static::lazy_static;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

pub struct TextUtils;

impl TextUtils {
    /// Case-insensitive substring test.
    pub fn contains_ignore_case(text: &str, pattern: &str) -> bool {
        text.to_lowercase().contains(&pattern.to_lowercase())
    }

    /// Collapse whitespace runs to single spaces and trim.
    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        let trimmed = text.trim();
        if trimmed.chars().any(|c| c.is_whitespace() && c != ' ') || trimmed.contains("  ") {
            Cow::Owned(WHITESPACE_REGEX.replace_all(trimmed, " ").into_owned())
        } else {
            Cow::Borrowed(trimmed)
        }
    }

    /// Answers match when equal after whitespace normalisation, ignoring case.
    pub fn answers_match(given: &str, expected: &str) -> bool {
        Self::normalize_whitespace(given).to_lowercase() == Self::normalize_whitespace(expected).to_lowercase()
    }

    /// Truncate to `max_chars` characters, ending in "..." when cut.
    pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> Cow<'_, str> {
        if text.chars().count() <= max_chars {
            return Cow::Borrowed(text);
        }
        if max_chars <= 3 {
            return Cow::Borrowed("...");
        }
        let mut result: String = text.chars().take(max_chars - 3).collect();
        result.push_str("...");
        Cow::Owned(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_ignore_case() {
        assert!(TextUtils::contains_ignore_case("That's CORRECT!", "correct"));
        assert!(!TextUtils::contains_ignore_case("Not quite right", "correct"));
    }

    #[test]
    fn test_answers_match_trims_and_ignores_case() {
        assert!(TextUtils::answers_match("  Paris ", "paris"));
        assert!(TextUtils::answers_match("New \t York", "new york"));
        assert!(!TextUtils::answers_match("", "paris"));
        assert!(!TextUtils::answers_match("Lyon", "Paris"));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(TextUtils::normalize_whitespace("a \t b\n c"), "a b c");
        assert!(matches!(TextUtils::normalize_whitespace(" plain "), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(TextUtils::truncate_with_ellipsis("héllo wörld", 8), "héllo...");
        assert_eq!(TextUtils::truncate_with_ellipsis("short", 10), "short");
    }
}
