//! Shared utility helpers.

/// Truncate a string to `max` chars, appending `…` if trimmed.
pub fn truncate_str(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}…", &s[..end]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_are_untouched() {
        assert_eq!(truncate_str("abc", 3), "abc");
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(truncate_str("héllo", 2), "hé…");
        assert_eq!(truncate_str("hello", 2), "he…");
        assert_eq!(truncate_str("日本語", 3), "日本語");
    }
}
