//! Prompt construction for the reasoning service

use crate::agent::memory::MemoryContext;
use crate::tools::ToolRegistry;

/// Reply prefix that ends the run successfully
pub const DONE_MARKER: &str = "DONE:";

/// Reply prefix that ends the run as failed
pub const FAILED_MARKER: &str = "FAILED:";

/// System prompt describing the tools and the reply protocol
pub fn system_prompt(registry: &ToolRegistry) -> String {
    let tools: Vec<String> = registry
        .definitions()
        .iter()
        .map(|def| format!("- `{}`: {}", def.function.name, def.function.description))
        .collect();

    format!(
        r#"You are an autonomous browser agent that completes tasks by interacting with web pages.
You work step by step and see the page state after every action.

## Tools
{}

## Rules
1. Call exactly ONE tool per turn.
2. Describe elements in plain words in the `target` argument (e.g. "Search input", "Add to cart button").
   Use `query_dom` when you are unsure what is on the page, then prefer its exact `css=` locators.
3. After typing into a search field, press Enter.
4. If an action failed, read the notes in the history and choose a different approach.
   Do not repeat an attempt the history marks as already tried.
5. Actions that pay, order, send, publish or delete are shown to the user for confirmation.
   A rejected step means the user said no; do not retry it.

## Finishing
When the task is complete, reply without a tool call:
{} <brief summary of what was accomplished>

If the task cannot be completed, reply without a tool call:
{} <what went wrong and what you tried>"#,
        tools.join("\n"),
        DONE_MARKER,
        FAILED_MARKER
    )
}

/// Per-turn prompt: task, latest page state and compressed history
pub fn render_context(context: &MemoryContext) -> String {
    let history = if context.summary.is_none() && context.verbatim.is_empty() {
        "No actions taken yet.".to_string()
    } else {
        context
            .entries()
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"## Current Task
{}

## Current Page State
{}

## Recent History
{}

## Your Turn
Analyze the current state and take the next action toward completing the task."#,
        context.task,
        context.observation.to_prompt_text(),
        history
    )
}
