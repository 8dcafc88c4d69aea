//! Reasoning service trait
//!
//! The orchestrator asks a `ReasoningService` for the next action and never
//! cares which backend answers.

use async_trait::async_trait;

use crate::agent::memory::MemoryContext;
use crate::core::{Result, TokenUsage, ToolCall, ToolDefinition};

/// Everything the reasoning service gets for one planning turn
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub task: String,
    /// Summary, verbatim tail and latest observation
    pub context: MemoryContext,
    /// Tools the reply may invoke
    pub tools: Vec<ToolDefinition>,
    pub system_prompt: String,
}

/// Raw reply, before it is validated into an `Intent`
#[derive(Debug, Clone, Default)]
pub struct ReasoningReply {
    /// Text content of the response
    pub content: String,
    /// Any tool calls the model wants to make
    pub tool_calls: Vec<ToolCall>,
    /// Token usage information
    pub usage: Option<TokenUsage>,
    /// Model that generated the response
    pub model: String,
}

impl ReasoningReply {
    /// Reply carrying only text
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Reply carrying a single tool call
    pub fn call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_calls: vec![ToolCall::new(name, arguments)],
            ..Self::default()
        }
    }
}

/// Trait for reasoning backends
///
/// Errors must be `PilotError::ReasoningService`, flagged recoverable when
/// asking again may succeed.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Ask for the next step
    async fn next_intent(&self, request: &ReasoningRequest) -> Result<ReasoningReply>;

    /// Get the provider name
    fn name(&self) -> &str;
}
