//! Shared types used across webpilot modules
//!
//! Contains the run data model (task, steps, observations, candidates,
//! intents, policy decisions, locators) and the tool-call structures
//! exchanged with the reasoning service.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message sent to or received from the reasoning service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: String,
    /// Content of the message
    pub content: String,
    /// Optional tool calls made by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }
}

/// A tool call proposed by the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke
    pub name: String,
    /// JSON arguments for the tool
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Get a string argument by key
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// Get a boolean argument by key
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.arguments.get(key).and_then(|v| v.as_bool())
    }

    /// Get an integer argument by key
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.arguments.get(key).and_then(|v| v.as_i64())
    }

    /// Get a numeric argument by key
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.arguments.get(key).and_then(|v| v.as_f64())
    }

    /// The natural-language element reference, if the call carries one
    pub fn target(&self) -> Option<String> {
        self.get_string("target")
    }
}

/// Definition of a tool the reasoning service may call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Type of tool (always "function" for now)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function details
    pub function: FunctionDefinition,
}

/// Function definition within a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new function tool definition
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    /// Names listed in the schema's `required` array
    pub fn required_params(&self) -> Vec<&str> {
        self.function
            .parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Declared JSON type of a parameter
    pub fn param_type(&self, name: &str) -> Option<&str> {
        self.function
            .parameters
            .get("properties")
            .and_then(|p| p.get(name))
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
    }
}

/// Result of executing a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Whether the execution was successful
    pub success: bool,
    /// Output from the tool
    pub output: String,
    /// Optional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// Create a successful result with structured data
    pub fn success_with_data(
        tool_name: impl Into<String>,
        output: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output: output.into(),
            data: Some(data),
        }
    }

    /// Create a failed result
    pub fn failure(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: error.into(),
            data: None,
        }
    }
}

/// Token counts reported by the reasoning service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// The natural-language goal of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub run_id: Uuid,
    pub goal: String,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            goal: goal.into(),
            created_at: Utc::now(),
        }
    }
}

/// Snapshot of page state, produced fresh on every observe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub url: String,
    pub title: String,
    /// Visible text, bounded by `agent.max_observation_chars`
    pub text_summary: String,
    /// Where the screenshot for this observation was written
    pub screenshot: Option<String>,
    /// An input, textarea or select currently has focus
    pub has_input_focused: bool,
    pub scroll_y: i64,
    pub page_height: i64,
    pub captured_at: DateTime<Utc>,
}

impl Observation {
    /// Observation with only url and title known
    pub fn blank(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            text_summary: String::new(),
            screenshot: None,
            has_input_focused: false,
            scroll_y: 0,
            page_height: 0,
            captured_at: Utc::now(),
        }
    }

    /// Render for the reasoning-service prompt
    pub fn to_prompt_text(&self) -> String {
        let mut parts = vec![
            format!("URL: {}", self.url),
            format!("Title: {}", self.title),
            format!("Page summary: {}", self.text_summary),
        ];
        if let Some(shot) = &self.screenshot {
            parts.push(format!("Screenshot saved: {}", shot));
        }
        if self.has_input_focused {
            parts.push("Note: An input field is currently focused".to_string());
        }
        parts.push(format!(
            "Scroll: {}px from top, page height: {}px",
            self.scroll_y, self.page_height
        ));
        parts.join("\n")
    }
}

/// One step of an element's structural path, outermost first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub tag: String,
    /// 1-based position among siblings of the same tag
    pub nth_of_type: usize,
    /// First class name that is not a generated utility class
    pub class: Option<String>,
}

/// A DOM element considered as an action target
///
/// Produced by a browser query and consumed by selector resolution; never
/// stored past that call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub tag: String,
    pub role: Option<String>,
    /// Stable attributes present on the element (test ids, aria-label, name)
    pub attributes: BTreeMap<String, String>,
    pub id: Option<String>,
    /// The id looks framework-generated and must not be used as a locator
    pub id_generated: bool,
    pub structural_path: Vec<PathSegment>,
    pub text: String,
    pub has_bbox: bool,
    pub in_viewport: bool,
}

impl Candidate {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            role: None,
            attributes: BTreeMap::new(),
            id: None,
            id_generated: false,
            structural_path: Vec::new(),
            text: String::new(),
            has_bbox: true,
            in_viewport: true,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.structural_path = path;
        self
    }

    pub fn offscreen(mut self) -> Self {
        self.in_viewport = false;
        self
    }
}

/// The reasoning service's decision for one turn, after validation
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Invoke a registered tool
    Action(ToolCall),
    /// Task finished successfully
    Complete { summary: String },
    /// Task cannot be finished
    Fail { reason: String },
}

/// Reversibility/impact class of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Safe,
    Caution,
    Destructive,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Safe => write!(f, "safe"),
            RiskTier::Caution => write!(f, "caution"),
            RiskTier::Destructive => write!(f, "destructive"),
        }
    }
}

/// Outcome of classifying one intent against the current page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub tier: RiskTier,
    pub reason: String,
    pub requires_confirmation: bool,
    /// Name of the rule that matched, if any
    pub rule: Option<String>,
}

/// Locator strategies, most stable first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    StableAttribute,
    UniqueId,
    StructuralPath,
    TextMatch,
}

impl LocatorStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::StableAttribute => "stable_attribute",
            LocatorStrategy::UniqueId => "unique_id",
            LocatorStrategy::StructuralPath => "structural_path",
            LocatorStrategy::TextMatch => "text_match",
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dispatchable element reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub selector: String,
    pub strategy: LocatorStrategy,
    /// Position in the ranked candidate list, 0 = best
    pub rank: usize,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} #{}]", self.selector, self.strategy, self.rank)
    }
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    /// Confirmation declined; nothing was dispatched
    Rejected,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Succeeded => write!(f, "succeeded"),
            StepOutcome::Failed => write!(f, "failed"),
            StepOutcome::Rejected => write!(f, "rejected"),
        }
    }
}

/// Tool name recorded for a step that only asked the reasoning service to replan
pub const REPLAN_TOOL: &str = "replan";

/// A step before the run context assigns its index and timestamp
#[derive(Debug, Clone)]
pub struct PendingStep {
    pub intent: ToolCall,
    pub outcome: StepOutcome,
    pub summary: String,
    pub locator: Option<Locator>,
    pub policy: Option<PolicyDecision>,
    pub confirmed: Option<bool>,
    pub diagnostics: Vec<String>,
}

impl PendingStep {
    pub fn new(intent: ToolCall, outcome: StepOutcome, summary: impl Into<String>) -> Self {
        Self {
            intent,
            outcome,
            summary: summary.into(),
            locator: None,
            policy: None,
            confirmed: None,
            diagnostics: Vec::new(),
        }
    }

    /// Synthetic step for a reply that could not be used
    pub fn replan(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ToolCall::new(REPLAN_TOOL, serde_json::json!({})),
            StepOutcome::Failed,
            format!("Reply discarded, asking for a new plan: {}", reason),
        )
        .with_diagnostic(reason)
    }

    pub fn with_policy(mut self, decision: PolicyDecision, confirmed: Option<bool>) -> Self {
        self.policy = Some(decision);
        self.confirmed = confirmed;
        self
    }

    pub fn with_locator(mut self, locator: Option<Locator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_diagnostic(mut self, note: impl Into<String>) -> Self {
        self.diagnostics.push(note.into());
        self
    }

    pub fn with_diagnostics(mut self, notes: Vec<String>) -> Self {
        self.diagnostics.extend(notes);
        self
    }
}

/// One recorded loop iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Contiguous from 0 within a run
    pub index: usize,
    /// The tool call as issued by the reasoning service
    pub intent: ToolCall,
    pub outcome: StepOutcome,
    /// Result or failure summary
    pub summary: String,
    /// Locator that was finally dispatched against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<Locator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyDecision>,
    /// Confirmation answer, when one was asked for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub(crate) fn from_pending(index: usize, pending: PendingStep) -> Self {
        Self {
            index,
            intent: pending.intent,
            outcome: pending.outcome,
            summary: pending.summary,
            locator: pending.locator,
            policy: pending.policy,
            confirmed: pending.confirmed,
            diagnostics: pending.diagnostics,
            timestamp: Utc::now(),
        }
    }

    /// The step's target description, if its tool addresses an element
    pub fn target(&self) -> Option<String> {
        self.intent.target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_accessors() {
        let call = ToolCall::new(
            "type_text",
            json!({"target": "Search box", "text": "rust", "clear": true, "n": 3}),
        );
        assert_eq!(call.target().as_deref(), Some("Search box"));
        assert_eq!(call.get_bool("clear"), Some(true));
        assert_eq!(call.get_i64("n"), Some(3));
        assert_eq!(call.get_string("missing"), None);
    }

    #[test]
    fn test_definition_schema_helpers() {
        let def = ToolDefinition::function(
            "click",
            "Click",
            json!({
                "type": "object",
                "properties": {"target": {"type": "string", "description": "x"}},
                "required": ["target"]
            }),
        );
        assert_eq!(def.required_params(), vec!["target"]);
        assert_eq!(def.param_type("target"), Some("string"));
        assert_eq!(def.param_type("other"), None);
    }

    #[test]
    fn test_strategy_order() {
        assert!(LocatorStrategy::StableAttribute < LocatorStrategy::UniqueId);
        assert!(LocatorStrategy::UniqueId < LocatorStrategy::StructuralPath);
        assert!(LocatorStrategy::StructuralPath < LocatorStrategy::TextMatch);
    }

    #[test]
    fn test_replan_step() {
        let step = PendingStep::replan("unknown tool 'teleport'");
        assert_eq!(step.intent.name, REPLAN_TOOL);
        assert_eq!(step.outcome, StepOutcome::Failed);
        assert_eq!(step.diagnostics, vec!["unknown tool 'teleport'".to_string()]);
    }

    #[test]
    fn test_observation_prompt_text() {
        let mut obs = Observation::blank("https://example.com", "Example");
        obs.has_input_focused = true;
        let text = obs.to_prompt_text();
        assert!(text.contains("URL: https://example.com"));
        assert!(text.contains("input field is currently focused"));
    }
}
