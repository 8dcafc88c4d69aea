//! Selector synthesis from ranked candidates
//!
//! Turns a ranked candidate into a locator string in the strategy of its
//! tier. Resolution consumes the candidate list; only locators leave this
//! module.

use crate::core::{Candidate, Locator, LocatorStrategy, PathSegment, PilotError, Result};
use crate::selector::ranker::{self, RankedCandidate};

/// Ancestor depth kept in a structural path
const MAX_PATH_DEPTH: usize = 4;

/// Visible text kept in a text-match locator
const MAX_TEXT_CHARS: usize = 40;

/// Ordered locators for one target description, best first
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub target: String,
    pub locators: Vec<Locator>,
}

impl Resolution {
    /// Top-ranked locator
    pub fn primary(&self) -> Option<&Locator> {
        self.locators.first()
    }

    /// Locator at a given rank, if the list is that long
    pub fn at(&self, rank: usize) -> Option<&Locator> {
        self.locators.get(rank)
    }

    /// Alternatives ranked below `rank`
    pub fn remaining_after(&self, rank: usize) -> usize {
        self.locators.len().saturating_sub(rank + 1)
    }
}

/// Rank candidates for `target` and synthesize a locator for each
///
/// Fails with a selector-resolution error when no candidate is usable.
/// Candidates that would produce a selector already in the list are
/// skipped so every alternative addresses something different.
pub fn resolve(target: &str, candidates: Vec<Candidate>) -> Result<Resolution> {
    let queried = candidates.len();
    let ranked = ranker::rank(candidates, target);

    let mut locators: Vec<Locator> = Vec::with_capacity(ranked.len());
    for candidate in &ranked {
        let selector = selector_for(candidate);
        if locators.iter().any(|l| l.selector == selector) {
            continue;
        }
        locators.push(Locator {
            selector,
            strategy: candidate.strategy,
            rank: locators.len(),
        });
    }

    if locators.is_empty() {
        let reason = if queried == 0 {
            "no element on the page matched".to_string()
        } else {
            format!("none of {} queried elements can be addressed", queried)
        };
        return Err(PilotError::unresolved(target, reason));
    }

    Ok(Resolution {
        target: target.to_string(),
        locators,
    })
}

/// Prefix marking a target as a literal CSS selector
pub const EXPLICIT_PREFIX: &str = "css=";

/// Locator for a target given as `css=<selector>`, bypassing candidate ranking
pub fn explicit_locator(target: &str) -> Option<Locator> {
    let selector = target.trim().strip_prefix(EXPLICIT_PREFIX)?.trim();
    if selector.is_empty() {
        return None;
    }
    let strategy = if selector.starts_with('[') {
        LocatorStrategy::StableAttribute
    } else if selector.starts_with('#') {
        LocatorStrategy::UniqueId
    } else if selector.contains(":has-text(") {
        LocatorStrategy::TextMatch
    } else {
        LocatorStrategy::StructuralPath
    };
    Some(Locator {
        selector: selector.to_string(),
        strategy,
        rank: 0,
    })
}

/// Locator string for a ranked candidate, in the strategy it was ranked by
pub fn selector_for(ranked: &RankedCandidate) -> String {
    let candidate = &ranked.candidate;
    match ranked.strategy {
        LocatorStrategy::StableAttribute => match ranker::stable_attribute(candidate) {
            Some((name, value)) => format!("[{}=\"{}\"]", name, escape_css_value(value)),
            None => text_selector(candidate),
        },
        LocatorStrategy::UniqueId => match ranker::usable_id(candidate) {
            Some(id) => format!("#{}", escape_css_id(id)),
            None => text_selector(candidate),
        },
        LocatorStrategy::StructuralPath => structural_selector(&candidate.structural_path),
        LocatorStrategy::TextMatch => text_selector(candidate),
    }
}

/// `tag.class:nth-of-type(n) > ...` over the innermost ancestors
pub fn structural_selector(path: &[PathSegment]) -> String {
    let start = path.len().saturating_sub(MAX_PATH_DEPTH);
    path[start..]
        .iter()
        .map(|segment| {
            let mut part = segment.tag.to_lowercase();
            if let Some(class) = segment.class.as_deref().filter(|c| !is_utility_class(c)) {
                part.push('.');
                part.push_str(&escape_css_id(class));
            }
            if segment.nth_of_type > 1 {
                part.push_str(&format!(":nth-of-type({})", segment.nth_of_type));
            }
            part
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

fn text_selector(candidate: &Candidate) -> String {
    let text: String = crate::core::text::clean_text(&candidate.text)
        .chars()
        .take(MAX_TEXT_CHARS)
        .collect();
    format!(
        "{}:has-text(\"{}\")",
        candidate.tag.to_lowercase(),
        escape_css_value(&text)
    )
}

/// Class names emitted by CSS-in-JS tooling or otherwise unlikely to be stable
pub fn is_utility_class(class: &str) -> bool {
    const GENERATED_PREFIXES: [&str; 6] = ["css-", "sc-", "emotion-", "jsx-", "svelte-", "__"];

    if GENERATED_PREFIXES.iter().any(|p| class.starts_with(p)) {
        return true;
    }
    let len = class.chars().count();
    if !(2..=40).contains(&len) {
        return true;
    }
    class.chars().filter(|c| c.is_ascii_digit()).count() * 2 > len
}

/// Escape a value for use inside a double-quoted attribute selector
pub fn escape_css_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\n', '\r'], " ")
}

/// Escape an identifier for use after `#` or `.`
///
/// Letters, digits, `-`, `_` and non-ASCII pass through; other ASCII is
/// backslash-escaped, control characters as hex. A leading digit, or a
/// digit after a leading `-`, is hex-escaped as CSS requires.
pub fn escape_css_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 4);
    for (i, c) in id.chars().enumerate() {
        let leading_digit = c.is_ascii_digit() && (i == 0 || (i == 1 && id.starts_with('-')));
        if leading_digit || c.is_ascii_control() {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(tag: &str, nth: usize, class: Option<&str>) -> PathSegment {
        PathSegment {
            tag: tag.to_string(),
            nth_of_type: nth,
            class: class.map(str::to_string),
        }
    }

    #[test]
    fn test_explicit_locator() {
        let locator = explicit_locator("css=#checkout-btn").unwrap();
        assert_eq!(locator.selector, "#checkout-btn");
        assert_eq!(locator.strategy, LocatorStrategy::UniqueId);
        assert_eq!(
            explicit_locator("css= [data-testid=\"buy\"]").unwrap().strategy,
            LocatorStrategy::StableAttribute
        );
        assert!(explicit_locator("the buy button").is_none());
        assert!(explicit_locator("css=  ").is_none());
    }

    #[test]
    fn test_attribute_locator() {
        let c = Candidate::new("button").with_attribute("data-testid", "add \"to\" cart");
        let resolution = resolve("add to cart", vec![c]).unwrap();
        let locator = resolution.primary().unwrap();
        assert_eq!(locator.selector, r#"[data-testid="add \"to\" cart"]"#);
        assert_eq!(locator.strategy, LocatorStrategy::StableAttribute);
    }

    #[test]
    fn test_id_locator_escapes() {
        assert_eq!(escape_css_id("1st-item"), "\\31 st-item");
        assert_eq!(escape_css_id("form:email"), "form\\:email");
        assert_eq!(escape_css_id("a,b>c+d~e"), "a\\,b\\>c\\+d\\~e");
        assert_eq!(escape_css_id("say\"hi'"), "say\\\"hi\\'");
        assert_eq!(escape_css_id("-1x"), "-\\31 x");
        assert_eq!(escape_css_id("tab\there"), "tab\\9 here");

        let c = Candidate::new("input").with_id("search");
        let resolution = resolve("search", vec![c]).unwrap();
        assert_eq!(resolution.primary().unwrap().selector, "#search");
        assert_eq!(resolution.primary().unwrap().strategy, LocatorStrategy::UniqueId);
    }

    #[test]
    fn test_structural_path_keeps_innermost_segments() {
        let path = vec![
            segment("html", 1, None),
            segment("body", 1, None),
            segment("div", 1, Some("settings")),
            segment("section", 2, Some("css-1x2y3z")),
            segment("ul", 1, Some("menu")),
            segment("li", 3, None),
        ];
        assert_eq!(
            structural_selector(&path),
            "div.settings > section:nth-of-type(2) > ul.menu > li:nth-of-type(3)"
        );
    }

    #[test]
    fn test_text_fallback_truncates() {
        let long = "Delete account and all associated data permanently from the service";
        let c = Candidate::new("BUTTON").with_text(long);
        let resolution = resolve("Delete account", vec![c]).unwrap();
        let locator = resolution.primary().unwrap();
        assert_eq!(locator.strategy, LocatorStrategy::TextMatch);
        assert_eq!(
            locator.selector,
            "button:has-text(\"Delete account and all associated data p\")"
        );
    }

    #[test]
    fn test_utility_classes() {
        assert!(is_utility_class("css-1x2y3z"));
        assert!(is_utility_class("sc-bdVaJa"));
        assert!(is_utility_class("a"));
        assert!(is_utility_class("x1234"));
        assert!(!is_utility_class("menu"));
    }

    #[test]
    fn test_resolution_orders_and_dedups() {
        let candidates = vec![
            Candidate::new("button").with_text("Save"),
            Candidate::new("button").with_text("Save"),
            Candidate::new("button").with_attribute("name", "save"),
        ];
        let resolution = resolve("save", candidates).unwrap();
        assert_eq!(resolution.locators.len(), 2);
        assert_eq!(resolution.locators[0].selector, "[name=\"save\"]");
        assert_eq!(resolution.locators[1].rank, 1);
        assert_eq!(resolution.remaining_after(0), 1);
        assert_eq!(resolution.remaining_after(1), 0);
    }

    #[test]
    fn test_empty_resolution_fails() {
        let err = resolve("checkout", Vec::new()).unwrap_err();
        assert!(matches!(err, PilotError::SelectorResolution { .. }));
        assert!(err.to_string().contains("checkout"));
    }
}
