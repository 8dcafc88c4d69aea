//! Candidate ranking by locator stability
//!
//! Candidates relevant to the target description are ordered by the most
//! stable strategy they support, then by viewport visibility, bounding-box
//! presence and document order. The sort is stable and every key is
//! total, so the same candidate list always ranks the same way.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::text::score_text_match;
use crate::core::{Candidate, LocatorStrategy};

/// Attributes that survive re-renders, in preference order
pub const STABLE_ATTRIBUTES: [&str; 5] = ["data-testid", "data-qa", "data-test", "aria-label", "name"];

/// Id fragments emitted by frameworks and component libraries
const FRAMEWORK_ID_MARKERS: [&str; 5] = ["react-", "ember", "vue-", ":r", ":R"];

/// Prefixes of ids produced by generic counters
const COUNTER_ID_PREFIXES: [&str; 3] = ["uid-", "id-", "el-"];

static RANDOM_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[-_:])(?:[0-9a-f]{6,}|[0-9A-Za-z]{10,})$").expect("valid suffix pattern")
});

/// Heuristic for ids that change between page loads
pub fn looks_generated(id: &str) -> bool {
    let id = id.trim();
    if id.is_empty() || id.len() > 32 {
        return true;
    }
    if FRAMEWORK_ID_MARKERS.iter().any(|m| id.contains(m))
        || COUNTER_ID_PREFIXES.iter().any(|p| id.starts_with(p))
    {
        return true;
    }

    let alnum = id.chars().filter(|c| c.is_alphanumeric()).count();
    let digits = id.chars().filter(|c| c.is_ascii_digit()).count();
    if alnum > 0 && digits * 2 > alnum {
        return true;
    }

    // A hex run or a long mixed-case token at the end reads as a hash
    RANDOM_SUFFIX.is_match(id) && id.chars().any(|c| c.is_ascii_digit())
}

/// First stable attribute with a non-empty value
pub fn stable_attribute(candidate: &Candidate) -> Option<(&'static str, &str)> {
    STABLE_ATTRIBUTES.iter().find_map(|name| {
        candidate
            .attributes
            .get(*name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| (*name, v))
    })
}

/// The id, when it is safe to address the element by it
///
/// Ids with whitespace are never valid in HTML and cannot be selected.
pub fn usable_id(candidate: &Candidate) -> Option<&str> {
    candidate.id.as_deref().filter(|id| {
        !candidate.id_generated && !looks_generated(id) && !id.chars().any(char::is_whitespace)
    })
}

/// Most stable strategy the candidate supports
pub fn best_strategy(candidate: &Candidate) -> Option<LocatorStrategy> {
    if stable_attribute(candidate).is_some() {
        Some(LocatorStrategy::StableAttribute)
    } else if usable_id(candidate).is_some() {
        Some(LocatorStrategy::UniqueId)
    } else if !candidate.structural_path.is_empty() {
        Some(LocatorStrategy::StructuralPath)
    } else if !candidate.text.trim().is_empty() {
        Some(LocatorStrategy::TextMatch)
    } else {
        None
    }
}

/// How well a candidate matches the target description
pub fn relevance(description: &str, candidate: &Candidate) -> f64 {
    let mut best = score_text_match(description, &candidate.text);
    for value in candidate.attributes.values() {
        best = best.max(score_text_match(description, value));
    }
    if let Some(id) = &candidate.id {
        best = best.max(score_text_match(description, &id.replace(['-', '_'], " ")));
    }
    best
}

/// A candidate with the strategy it will be addressed by
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub strategy: LocatorStrategy,
    /// Index in the list the browser returned
    pub document_order: usize,
}

/// Coarse band of a relevance score: exact, whole-word containment, word overlap
fn match_class(score: f64) -> u8 {
    if score >= 1.0 {
        3
    } else if score >= 0.8 {
        2
    } else if score > 0.0 {
        1
    } else {
        0
    }
}

/// Order candidates for a target description, most stable first
///
/// Only candidates in the same match class as the best-matching one are
/// kept, so an element sharing a single word with the description never
/// displaces one that matches it outright. When nothing matches, the
/// browser's own filtering is trusted and all are ranked. Candidates with
/// no usable strategy are dropped.
pub fn rank(candidates: Vec<Candidate>, description: &str) -> Vec<RankedCandidate> {
    let scored: Vec<(Candidate, u8)> = candidates
        .into_iter()
        .map(|c| {
            let class = match_class(relevance(description, &c));
            (c, class)
        })
        .collect();
    let floor = scored.iter().map(|(_, class)| *class).max().unwrap_or(0);

    let mut ranked: Vec<RankedCandidate> = scored
        .into_iter()
        .enumerate()
        .filter(|(_, (_, class))| *class == floor)
        .filter_map(|(document_order, (candidate, _))| {
            best_strategy(&candidate).map(|strategy| RankedCandidate {
                candidate,
                strategy,
                document_order,
            })
        })
        .collect();

    ranked.sort_by_key(|r| {
        (
            r.strategy,
            !r.candidate.in_viewport,
            !r.candidate.has_bbox,
            r.document_order,
        )
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PathSegment;

    fn path(tag: &str) -> Vec<PathSegment> {
        vec![
            PathSegment {
                tag: "main".to_string(),
                nth_of_type: 1,
                class: None,
            },
            PathSegment {
                tag: tag.to_string(),
                nth_of_type: 2,
                class: None,
            },
        ]
    }

    #[test]
    fn test_generated_ids() {
        assert!(looks_generated("react-select-3-input"));
        assert!(looks_generated(":r1a:"));
        assert!(looks_generated("12345"));
        assert!(looks_generated("btn-8f3a2c91"));
        assert!(!looks_generated("search"));
        assert!(!looks_generated("login-form"));
        assert!(!looks_generated("submit_button"));
        assert!(looks_generated("uid-42"));
        assert!(!looks_generated("panel-search"));
    }

    #[test]
    fn test_strategy_tiers() {
        let attr = Candidate::new("button").with_attribute("data-testid", "buy");
        let id = Candidate::new("button").with_id("checkout");
        let generated = Candidate::new("button").with_id("ember123").with_text("Go");
        let structural = Candidate::new("button").with_path(path("button"));
        let text = Candidate::new("button").with_text("Delete account");

        assert_eq!(best_strategy(&attr), Some(LocatorStrategy::StableAttribute));
        assert_eq!(best_strategy(&id), Some(LocatorStrategy::UniqueId));
        assert_eq!(best_strategy(&generated), Some(LocatorStrategy::TextMatch));
        assert_eq!(best_strategy(&structural), Some(LocatorStrategy::StructuralPath));
        assert_eq!(best_strategy(&text), Some(LocatorStrategy::TextMatch));
        assert_eq!(best_strategy(&Candidate::new("div")), None);
    }

    #[test]
    fn test_id_with_whitespace_is_unusable() {
        let c = Candidate::new("button").with_id("save draft").with_text("Save");
        assert_eq!(usable_id(&c), None);
        assert_eq!(best_strategy(&c), Some(LocatorStrategy::TextMatch));
        let c = Candidate::new("button").with_id("save,draft");
        assert_eq!(usable_id(&c), Some("save,draft"));
    }

    #[test]
    fn test_blank_attribute_is_ignored() {
        let c = Candidate::new("input")
            .with_attribute("data-testid", "  ")
            .with_attribute("name", "q");
        assert_eq!(stable_attribute(&c), Some(("name", "q")));
    }

    #[test]
    fn test_rank_prefers_stability_over_order() {
        let candidates = vec![
            Candidate::new("a").with_text("Cart"),
            Candidate::new("button").with_id("cart-button").with_text("Cart"),
            Candidate::new("button")
                .with_attribute("aria-label", "Cart")
                .with_text("Cart"),
        ];
        let ranked = rank(candidates, "cart");
        let order: Vec<usize> = ranked.iter().map(|r| r.document_order).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_rank_breaks_ties_by_viewport_then_order() {
        let candidates = vec![
            Candidate::new("button").with_text("Next").offscreen(),
            Candidate::new("button").with_text("Next"),
            Candidate::new("button").with_text("Next"),
        ];
        let ranked = rank(candidates, "Next");
        let order: Vec<usize> = ranked.iter().map(|r| r.document_order).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_rank_filters_irrelevant_candidates() {
        let candidates = vec![
            Candidate::new("a").with_text("Home"),
            Candidate::new("input").with_attribute("name", "search"),
        ];
        let ranked = rank(candidates, "Search box");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].document_order, 1);
    }

    #[test]
    fn test_stopword_overlap_does_not_outrank_named_element() {
        let candidates = vec![
            Candidate::new("a").with_attribute("aria-label", "Skip to content"),
            Candidate::new("button").with_text("Add to cart").with_path(path("button")),
        ];
        let ranked = rank(candidates, "Add to cart");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].document_order, 1);
        assert_eq!(ranked[0].strategy, LocatorStrategy::StructuralPath);
    }

    #[test]
    fn test_exact_match_beats_partial_overlap() {
        let candidates = vec![
            Candidate::new("a").with_attribute("data-testid", "cart-summary").with_text("Cart summary"),
            Candidate::new("button").with_text("Add to cart"),
            Candidate::new("button").with_id("add-to-wishlist").with_text("Add to wishlist"),
        ];
        let ranked = rank(candidates, "add to cart");
        let order: Vec<usize> = ranked.iter().map(|r| r.document_order).collect();
        assert_eq!(order, vec![1]);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let candidates: Vec<Candidate> = (0..6)
            .map(|i| {
                let c = Candidate::new("li").with_text(format!("Item {}", i));
                if i % 2 == 0 {
                    c.offscreen()
                } else {
                    c
                }
            })
            .collect();
        let first: Vec<usize> = rank(candidates.clone(), "item")
            .iter()
            .map(|r| r.document_order)
            .collect();
        let second: Vec<usize> = rank(candidates, "item")
            .iter()
            .map(|r| r.document_order)
            .collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![1, 3, 5, 0, 2, 4]);
    }
}
