//! Risk classification for proposed actions
//!
//! An ordered rule table, evaluated first-match-wins. Each rule names the
//! fields of the intent or page it inspects and what it looks for; adding a
//! rule never touches the orchestrator. Anything no rule matches is safe.

use url::Url;

use crate::core::text::words;
use crate::core::{Observation, PolicyDecision, RiskTier, ToolCall};

/// Part of the intent or current page a rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ToolName,
    /// Natural-language element reference
    Target,
    /// Text a `type_text` call would enter
    TypedText,
    PressedKeys,
    PageUrl,
    PageTitle,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::ToolName => "action",
            Field::Target => "target description",
            Field::TypedText => "typed text",
            Field::PressedKeys => "pressed keys",
            Field::PageUrl => "page URL",
            Field::PageTitle => "page title",
        }
    }

    fn extract(&self, call: &ToolCall, observation: &Observation) -> Option<String> {
        match self {
            Field::ToolName => Some(call.name.replace('_', " ")),
            Field::Target => call.target(),
            Field::TypedText => call.get_string("text"),
            Field::PressedKeys => call.get_string("keys"),
            Field::PageUrl => Some(url_text(&observation.url)),
            Field::PageTitle => Some(observation.title.clone()),
        }
    }
}

/// Host, path and query of a page URL; the raw string if it does not parse
fn url_text(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => format!(
            "{} {} {}",
            url.host_str().unwrap_or_default(),
            url.path(),
            url.query().unwrap_or_default()
        ),
        Err(_) => raw.to_string(),
    }
}

/// Lowercase words separated by single spaces, padded so phrases match on word boundaries
fn word_haystack(text: &str) -> String {
    format!(" {} ", words(text).join(" "))
}

/// What a rule looks for in its fields
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Any keyword or phrase, matched on whole words, case-insensitive
    Keywords(Vec<String>),
    /// Thirteen or more digits, ignoring separators
    CardNumber,
}

impl Matcher {
    fn find(&self, text: &str) -> Option<String> {
        match self {
            Matcher::Keywords(keywords) => {
                let haystack = word_haystack(text);
                keywords
                    .iter()
                    .find(|kw| haystack.contains(&word_haystack(kw)))
                    .cloned()
            }
            Matcher::CardNumber => {
                let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
                let only_separators = text
                    .chars()
                    .all(|c| c.is_ascii_digit() || c == ' ' || c == '-');
                (digits >= 13 && only_separators).then(|| "card number".to_string())
            }
        }
    }
}

/// One row of the classification table
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub name: String,
    /// Restrict the rule to these tools; `None` applies to every tool
    pub tools: Option<Vec<String>>,
    pub fields: Vec<Field>,
    pub matcher: Matcher,
    pub tier: RiskTier,
    pub reason: String,
}

impl PolicyRule {
    /// Rule triggered by any of `keywords` in any of `fields`
    pub fn keywords(
        name: impl Into<String>,
        keywords: &[&str],
        fields: &[Field],
        tier: RiskTier,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            tools: None,
            fields: fields.to_vec(),
            matcher: Matcher::Keywords(keywords.iter().map(|k| k.to_string()).collect()),
            tier,
            reason: reason.into(),
        }
    }

    /// Rule triggered by a card-number-like value in any of `fields`
    pub fn card_number(
        name: impl Into<String>,
        fields: &[Field],
        tier: RiskTier,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            tools: None,
            fields: fields.to_vec(),
            matcher: Matcher::CardNumber,
            tier,
            reason: reason.into(),
        }
    }

    /// Only evaluate this rule for the named tools
    pub fn for_tools(mut self, tools: &[&str]) -> Self {
        self.tools = Some(tools.iter().map(|t| t.to_string()).collect());
        self
    }

    fn evaluate(&self, call: &ToolCall, observation: &Observation) -> Option<(String, Field)> {
        if let Some(tools) = &self.tools {
            if !tools.iter().any(|t| t == &call.name) {
                return None;
            }
        }
        self.fields.iter().find_map(|field| {
            field
                .extract(call, observation)
                .and_then(|text| self.matcher.find(&text))
                .map(|hit| (hit, *field))
        })
    }
}

/// Element interactions that can complete a purchase
const INTERACTION_TOOLS: [&str; 3] = ["click", "type_text", "press"];

/// Ordered rule table mapping an intent on a page to a risk tier
#[derive(Debug, Clone)]
pub struct PolicyClassifier {
    rules: Vec<PolicyRule>,
}

impl PolicyClassifier {
    /// Classifier with the built-in rule table
    pub fn new() -> Self {
        let rules = vec![
            PolicyRule::keywords(
                "payment",
                &[
                    "pay",
                    "payment",
                    "buy",
                    "purchase",
                    "checkout",
                    "order",
                    "place order",
                    "confirm order",
                    "confirm purchase",
                    "proceed to payment",
                ],
                &[Field::Target, Field::ToolName],
                RiskTier::Destructive,
                "Payment, order or checkout action",
            ),
            PolicyRule::keywords(
                "submission",
                &["send", "submit", "publish", "post", "reply", "tweet"],
                &[Field::Target],
                RiskTier::Destructive,
                "Submits, sends or publishes content",
            )
            .for_tools(&["click", "press"]),
            PolicyRule::keywords(
                "deletion",
                &[
                    "delete",
                    "remove",
                    "erase",
                    "destroy",
                    "trash",
                    "spam",
                    "clear all",
                    "close account",
                    "deactivate",
                ],
                &[Field::Target, Field::ToolName],
                RiskTier::Destructive,
                "Deletes or irreversibly removes content",
            ),
            PolicyRule::keywords(
                "payment_page",
                &[
                    "checkout", "payment", "pay", "billing", "cart", "basket", "order", "orders",
                ],
                &[Field::PageUrl, Field::PageTitle],
                RiskTier::Destructive,
                "Interaction on a payment-flow page",
            )
            .for_tools(&INTERACTION_TOOLS),
            PolicyRule::keywords(
                "sensitive_field",
                &[
                    "card",
                    "cvv",
                    "cvc",
                    "credit",
                    "debit",
                    "password",
                    "pin",
                    "ssn",
                    "social security",
                    "security code",
                ],
                &[Field::Target],
                RiskTier::Destructive,
                "Types into a sensitive field",
            )
            .for_tools(&["type_text"]),
            PolicyRule::card_number(
                "card_number",
                &[Field::TypedText],
                RiskTier::Destructive,
                "Typed text looks like a payment card number",
            )
            .for_tools(&["type_text"]),
            PolicyRule::keywords(
                "account_exit",
                &["unsubscribe", "cancel subscription", "logout", "log out", "sign out"],
                &[Field::Target],
                RiskTier::Caution,
                "Ends a subscription or session",
            ),
        ];
        Self { rules }
    }

    /// Append a rule after the existing ones
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Classify an intent against the current page
    ///
    /// Depends only on its arguments; non-safe tiers always require
    /// confirmation.
    pub fn classify(&self, call: &ToolCall, observation: &Observation) -> PolicyDecision {
        for rule in &self.rules {
            if let Some((hit, field)) = rule.evaluate(call, observation) {
                return PolicyDecision {
                    tier: rule.tier,
                    reason: format!("{} (matched '{}' in {})", rule.reason, hit, field.label()),
                    requires_confirmation: rule.tier != RiskTier::Safe,
                    rule: Some(rule.name.clone()),
                };
            }
        }

        PolicyDecision {
            tier: RiskTier::Safe,
            reason: "No risk rule matched".to_string(),
            requires_confirmation: false,
            rule: None,
        }
    }
}

impl Default for PolicyClassifier {
    fn default() -> Self {
        Self::new()
    }
}
