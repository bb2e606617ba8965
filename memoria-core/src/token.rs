//! Token estimation and boundary-aware truncation (§4.C, §4.I).
//!
//! A fixed heuristic is used everywhere a token count is needed so that no
//! component depends on a tokenizer: roughly 4 characters per token,
//! ceiling-rounded. This is computed once where a count is persisted
//! (chunk insert) and trusted by every downstream reader.

/// Estimate the token count of `text` using the fixed chars/4 heuristic.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as f32;
    (chars / 4.0).ceil() as u32
}

/// Truncate `text` to at most `max_tokens` (by the same heuristic),
/// preferring a sentence boundary, falling back to a word boundary, and
/// finally a hard character cut if neither is found early enough.
pub fn truncate_to_tokens(text: &str, max_tokens: u32) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let max_chars = (max_tokens as f32 * 4.0) as usize;
    if max_chars == 0 {
        return String::new();
    }
    let hard_cut: String = text.chars().take(max_chars).collect();

    if let Some(idx) = hard_cut.rfind(['.', '!', '?']) {
        if idx > max_chars / 2 {
            return hard_cut[..=idx].to_string();
        }
    }
    if let Some(idx) = hard_cut.rfind(char::is_whitespace) {
        if idx > 0 {
            return hard_cut[..idx].trim_end().to_string();
        }
    }
    hard_cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_scales_with_length() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn short_text_is_not_truncated() {
        let text = "a short sentence.";
        assert_eq!(truncate_to_tokens(text, 100), text);
    }

    #[test]
    fn truncation_prefers_sentence_boundary() {
        let text = "First sentence is here. Second sentence runs on for a while longer than the budget allows.";
        let truncated = truncate_to_tokens(text, 8);
        assert!(truncated.ends_with('.'));
        assert!(truncated.len() < text.len());
    }

    #[test]
    fn truncation_falls_back_to_word_boundary() {
        let text = "wordwordwordwordword wordwordwordwordword wordwordwordwordword";
        let truncated = truncate_to_tokens(text, 5);
        assert!(!truncated.ends_with(' '));
        assert!(truncated.len() < text.len());
    }
}
