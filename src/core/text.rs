//! Small text helpers shared by observation, ranking and memory code

/// Collapse runs of whitespace into single spaces and trim
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, ending with `suffix` when cut
pub fn truncate_chars(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(suffix.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(suffix);
    out
}

/// Bound page text, preferring to stop at a sentence end in the second half
pub fn summarize_at_sentence(text: &str, max_chars: usize) -> String {
    let text = clean_text(text);
    if text.chars().count() <= max_chars {
        return text;
    }

    let truncated: String = text.chars().take(max_chars).collect();
    let best_end = truncated
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '?' | '!'))
        .map(|(i, _)| i)
        .last();

    if let Some(end) = best_end {
        // Byte offset compared against a char budget; page text is mostly ASCII
        // and the threshold only decides whether the cut looks natural.
        if truncated[..end].chars().count() > max_chars / 2 {
            return truncated[..=end].to_string();
        }
    }

    format!("{}...", truncated)
}

/// Words too common in element descriptions to identify anything
pub const STOPWORDS: [&str; 16] = [
    "the", "and", "for", "with", "into", "from", "this", "that", "your", "our", "button",
    "link", "field", "icon", "box", "element",
];

/// Lowercase alphanumeric words of `text`
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Words of a description that can identify an element
///
/// Words of two characters or fewer and stopwords are dropped.
pub fn significant_words(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// How well `query` matches `target`, from 0.0 to 1.0
///
/// Both sides are compared as lowercase words. Exact match scores 1.0,
/// containment as whole words 0.8, otherwise the share of the query's
/// significant words present in the target scaled to 0.6.
pub fn score_text_match(query: &str, target: &str) -> f64 {
    let query_words = words(query);
    let target_words = words(target);
    if query_words.is_empty() || target_words.is_empty() {
        return 0.0;
    }
    if query_words == target_words {
        return 1.0;
    }
    if format!(" {} ", target_words.join(" ")).contains(&format!(" {} ", query_words.join(" "))) {
        return 0.8;
    }

    let significant: std::collections::BTreeSet<String> =
        significant_words(query).into_iter().collect();
    if significant.is_empty() {
        return 0.0;
    }
    let overlap = significant
        .iter()
        .filter(|w| target_words.contains(*w))
        .count();

    overlap as f64 / significant.len() as f64 * 0.6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Sign \n\t in  "), "Sign in");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10, "..."), "short");
        assert_eq!(truncate_chars("abcdefghij", 6, "..."), "abc...");
    }

    #[test]
    fn test_summary_prefers_sentence_boundary() {
        let text = "First sentence is here. Second sentence runs on and on without end";
        let summary = summarize_at_sentence(text, 40);
        assert_eq!(summary, "First sentence is here.");
    }

    #[test]
    fn test_summary_falls_back_to_ellipsis() {
        let text = "Hi. This sentence is far too long to fit in the budget";
        let summary = summarize_at_sentence(text, 30);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), 33);
    }

    #[test]
    fn test_score_text_match() {
        assert_eq!(score_text_match("Search", "search"), 1.0);
        assert_eq!(score_text_match("cart", "Add to cart"), 0.8);
        assert!((score_text_match("delete my old account", "Delete account") - 0.4).abs() < 1e-9);
        assert_eq!(score_text_match("sign in", "sign-in"), 1.0);
        assert_eq!(score_text_match("login", "Checkout"), 0.0);
        assert_eq!(score_text_match("", "anything"), 0.0);
    }

    #[test]
    fn test_containment_needs_whole_words() {
        assert!(score_text_match("in", "Login") < 0.8);
        assert_eq!(score_text_match("log in", "Log in now"), 0.8);
    }

    #[test]
    fn test_stopwords_do_not_overlap() {
        assert_eq!(significant_words("Add to the cart button"), vec!["add", "cart"]);
        assert_eq!(score_text_match("Add to cart", "Skip to content"), 0.0);
        assert_eq!(score_text_match("the button", "Submit button"), 0.0);
    }
}
