//! Reply validation
//!
//! Replies are untrusted. A reply becomes an `Intent` only if it carries a
//! terminal marker or a tool call the registry accepts.

use tracing::warn;

use crate::agent::prompts::{DONE_MARKER, FAILED_MARKER};
use crate::core::{Intent, PilotError, Result};
use crate::llm::traits::ReasoningReply;
use crate::tools::ToolRegistry;

/// Turn a reasoning reply into a validated intent
///
/// Terminal markers only count when the reply carries no tool call. When
/// several tool calls come back, the first is used.
pub fn parse_intent(reply: &ReasoningReply, registry: &ToolRegistry) -> Result<Intent> {
    if let Some(call) = reply.tool_calls.first() {
        if reply.tool_calls.len() > 1 {
            warn!(
                count = reply.tool_calls.len(),
                used = %call.name,
                "Reply proposed several tool calls; using the first"
            );
        }
        registry.check_call(call)?;
        return Ok(Intent::Action(call.clone()));
    }

    if let Some(summary) = marker_text(&reply.content, DONE_MARKER) {
        return Ok(Intent::Complete { summary });
    }
    if let Some(reason) = marker_text(&reply.content, FAILED_MARKER) {
        return Ok(Intent::Fail { reason });
    }

    let preview = crate::core::text::truncate_chars(reply.content.trim(), 120, "...");
    Err(PilotError::malformed(if preview.is_empty() {
        "empty reply: no tool call and no DONE/FAILED marker".to_string()
    } else {
        format!("no tool call and no DONE/FAILED marker in: {}", preview)
    }))
}

/// Text after `marker` on the first line that starts with it
fn marker_text(content: &str, marker: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let line = line.trim().trim_start_matches(['*', '#', ' ']);
        line.strip_prefix(marker).map(|rest| {
            let rest = rest.trim_start_matches('*').trim();
            if rest.is_empty() {
                "(no details given)".to_string()
            } else {
                rest.to_string()
            }
        })
    })
}
