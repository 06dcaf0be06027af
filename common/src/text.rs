/// Char-safe preview of a message body for history listings.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(preview("hello", 40), "hello");
    }

    #[test]
    fn long_text_is_truncated_with_ellipsis() {
        let long = "a".repeat(50);
        let result = preview(&long, 40);
        assert_eq!(result.len(), 43);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "日本語のテキストです";
        let result = preview(text, 4);
        assert_eq!(result, "日本語の...");
    }
}
