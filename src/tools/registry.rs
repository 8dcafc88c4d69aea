//! Tool registry - the table of tools the reasoning service may call
//!
//! Each entry maps a tool name to its parameter schema and a handler that
//! turns validated arguments into an `Invocation`. The table is built once
//! and checked for schema completeness before a run starts.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::core::{PilotError, Result, ToolCall, ToolDefinition};
use crate::tools::browser::{BrowserAction, MAX_WAIT_SECS};

/// Tool categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    /// Changes which page is loaded
    Navigation,
    /// Acts on the current page
    Interaction,
    /// Reads without mutating
    Query,
}

/// What a validated tool call asks the orchestrator to do
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Dispatch to the browser, resolving `target` first when present
    Browser {
        action: BrowserAction,
        target: Option<String>,
    },
    /// Rank page elements for a description without acting on them
    QueryDom { query: String, limit: Option<usize> },
}

/// Converts validated arguments into an invocation
pub type ToolHandler = fn(&ToolCall) -> Result<Invocation>;

struct RegisteredTool {
    definition: ToolDefinition,
    category: ToolCategory,
    handler: ToolHandler,
}

/// Registry of available tools
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Registry holding the browser tool set
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_browser_tools();
        registry
    }

    /// Registry with no tools
    pub fn empty() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    fn register_browser_tools(&mut self) {
        self.register(
            ToolDefinition::function(
                "navigate_to_url",
                "Open a URL in the browser",
                json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "The URL to open; https:// is assumed when no scheme is given"
                        }
                    },
                    "required": ["url"]
                }),
            ),
            ToolCategory::Navigation,
            navigate_handler,
        );

        self.register(
            ToolDefinition::function(
                "click",
                "Click an element on the page",
                json!({
                    "type": "object",
                    "properties": {
                        "target": {
                            "type": "string",
                            "description": "Description of the element, e.g. 'Sign in button', or css=<selector>"
                        }
                    },
                    "required": ["target"]
                }),
            ),
            ToolCategory::Interaction,
            click_handler,
        );

        self.register(
            ToolDefinition::function(
                "type_text",
                "Type text into an input field",
                json!({
                    "type": "object",
                    "properties": {
                        "target": {
                            "type": "string",
                            "description": "Description of the input field, or css=<selector>"
                        },
                        "text": {
                            "type": "string",
                            "description": "Text to enter"
                        },
                        "clear": {
                            "type": "boolean",
                            "description": "Replace the current value instead of appending (default true)"
                        }
                    },
                    "required": ["target", "text"]
                }),
            ),
            ToolCategory::Interaction,
            type_text_handler,
        );

        self.register(
            ToolDefinition::function(
                "press",
                "Press a key or key combination, e.g. Enter or Control+a",
                json!({
                    "type": "object",
                    "properties": {
                        "keys": {
                            "type": "string",
                            "description": "Key name or combination"
                        }
                    },
                    "required": ["keys"]
                }),
            ),
            ToolCategory::Interaction,
            press_handler,
        );

        self.register(
            ToolDefinition::function(
                "scroll",
                "Scroll the page",
                json!({
                    "type": "object",
                    "properties": {
                        "amount": {
                            "type": "integer",
                            "description": "Pixels to scroll; positive scrolls down, negative up"
                        }
                    },
                    "required": ["amount"]
                }),
            ),
            ToolCategory::Query,
            scroll_handler,
        );

        self.register(
            ToolDefinition::function(
                "wait",
                "Wait for the page to settle",
                json!({
                    "type": "object",
                    "properties": {
                        "seconds": {
                            "type": "number",
                            "description": "Seconds to wait, at most 10"
                        }
                    },
                    "required": ["seconds"]
                }),
            ),
            ToolCategory::Query,
            wait_handler,
        );

        self.register(
            ToolDefinition::function(
                "hover",
                "Move the pointer over an element",
                json!({
                    "type": "object",
                    "properties": {
                        "target": {
                            "type": "string",
                            "description": "Description of the element, or css=<selector>"
                        }
                    },
                    "required": ["target"]
                }),
            ),
            ToolCategory::Interaction,
            hover_handler,
        );

        self.register(
            ToolDefinition::function(
                "back",
                "Go back to the previous page",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolCategory::Navigation,
            |_| browser(BrowserAction::Back, None),
        );

        self.register(
            ToolDefinition::function(
                "close_popups",
                "Close modal dialogs, cookie banners and popups covering the page",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolCategory::Interaction,
            |_| browser(BrowserAction::ClosePopups, None),
        );

        self.register(
            ToolDefinition::function(
                "query_dom",
                "List page elements matching a description with their locators, without acting on them",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What to look for, e.g. 'search input'"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of elements to return"
                        }
                    },
                    "required": ["query"]
                }),
            ),
            ToolCategory::Query,
            query_dom_handler,
        );

        self.register(
            ToolDefinition::function(
                "get_current_url",
                "Report the URL of the current page",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolCategory::Query,
            |_| browser(BrowserAction::CurrentUrl, None),
        );
    }

    /// Register a tool definition
    pub fn register(&mut self, definition: ToolDefinition, category: ToolCategory, handler: ToolHandler) {
        let name = definition.function.name.clone();
        self.tools.insert(
            name,
            RegisteredTool {
                definition,
                category,
                handler,
            },
        );
    }

    /// Get all tool definitions, in name order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn category(&self, name: &str) -> Option<ToolCategory> {
        self.tools.get(name).map(|t| t.category)
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    /// Check every schema is complete enough to show the reasoning service
    pub fn validate(&self) -> Result<()> {
        if self.tools.is_empty() {
            return Err(PilotError::registry("no tools registered"));
        }
        for (name, tool) in &self.tools {
            let def = &tool.definition;
            if def.function.description.trim().is_empty() {
                return Err(PilotError::registry(format!("tool '{}' has no description", name)));
            }
            let params = &def.function.parameters;
            if params.get("type").and_then(Value::as_str) != Some("object") {
                return Err(PilotError::registry(format!(
                    "tool '{}' parameters must be an object schema",
                    name
                )));
            }
            let properties = params
                .get("properties")
                .and_then(Value::as_object)
                .ok_or_else(|| PilotError::registry(format!("tool '{}' has no properties map", name)))?;

            for (param, schema) in properties {
                let typed = schema.get("type").and_then(Value::as_str).is_some();
                let described = schema
                    .get("description")
                    .and_then(Value::as_str)
                    .is_some_and(|d| !d.trim().is_empty());
                if !typed || !described {
                    return Err(PilotError::registry(format!(
                        "parameter '{}' of tool '{}' needs a type and a description",
                        param, name
                    )));
                }
            }
            for required in def.required_params() {
                if !properties.contains_key(required) {
                    return Err(PilotError::registry(format!(
                        "tool '{}' requires undeclared parameter '{}'",
                        name, required
                    )));
                }
            }
        }
        Ok(())
    }

    /// Reject calls naming unknown tools or carrying missing or mistyped arguments
    pub fn check_call(&self, call: &ToolCall) -> Result<()> {
        let tool = self.tools.get(&call.name).ok_or_else(|| {
            PilotError::malformed(format!(
                "unknown tool '{}'; available: {}",
                call.name,
                self.names().join(", ")
            ))
        })?;

        let empty = serde_json::Map::new();
        let args = match &call.arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(PilotError::malformed(format!(
                    "arguments for '{}' must be an object, got {}",
                    call.name, other
                )))
            }
        };

        let def = &tool.definition;
        for required in def.required_params() {
            if args.get(required).map_or(true, Value::is_null) {
                return Err(PilotError::malformed(format!(
                    "'{}' is missing required argument '{}'",
                    call.name, required
                )));
            }
        }
        for (param, value) in args {
            if value.is_null() {
                continue;
            }
            if let Some(expected) = def.param_type(param) {
                if !type_matches(expected, value) {
                    return Err(PilotError::malformed(format!(
                        "argument '{}' of '{}' should be {}, got {}",
                        param, call.name, expected, value
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate a call and convert it into what the orchestrator dispatches
    pub fn invocation(&self, call: &ToolCall) -> Result<Invocation> {
        self.check_call(call)?;
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| PilotError::malformed(format!("unknown tool '{}'", call.name)))?;
        (tool.handler)(call)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => integer_value(value).is_some(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

/// Integers, including integer-valued floats such as `600.0`
fn integer_value(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn browser(action: BrowserAction, target: Option<String>) -> Result<Invocation> {
    Ok(Invocation::Browser { action, target })
}

fn non_empty(call: &ToolCall, key: &str) -> Result<String> {
    call.get_string(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PilotError::malformed(format!("'{}' needs a non-empty '{}'", call.name, key)))
}

/// Parse a URL, assuming https when the scheme is missing
pub fn normalize_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if let Ok(parsed) = url::Url::parse(raw) {
        if parsed.has_host() || matches!(parsed.scheme(), "about" | "file" | "data") {
            return Ok(parsed.to_string());
        }
    }
    url::Url::parse(&format!("https://{}", raw))
        .map(|u| u.to_string())
        .map_err(|e| PilotError::malformed(format!("invalid url '{}': {}", raw, e)))
}

fn navigate_handler(call: &ToolCall) -> Result<Invocation> {
    let url = normalize_url(&non_empty(call, "url")?)?;
    browser(BrowserAction::Navigate { url }, None)
}

fn click_handler(call: &ToolCall) -> Result<Invocation> {
    browser(BrowserAction::Click, Some(non_empty(call, "target")?))
}

fn hover_handler(call: &ToolCall) -> Result<Invocation> {
    browser(BrowserAction::Hover, Some(non_empty(call, "target")?))
}

fn type_text_handler(call: &ToolCall) -> Result<Invocation> {
    let target = non_empty(call, "target")?;
    let text = call.get_string("text").unwrap_or_default();
    let clear = call.get_bool("clear").unwrap_or(true);
    browser(BrowserAction::TypeText { text, clear }, Some(target))
}

fn press_handler(call: &ToolCall) -> Result<Invocation> {
    browser(BrowserAction::Press { keys: non_empty(call, "keys")? }, None)
}

fn scroll_handler(call: &ToolCall) -> Result<Invocation> {
    let amount = call
        .arguments
        .get("amount")
        .and_then(integer_value)
        .ok_or_else(|| PilotError::malformed("'scroll' needs an integer 'amount'"))?;
    browser(BrowserAction::Scroll { amount }, None)
}

fn wait_handler(call: &ToolCall) -> Result<Invocation> {
    let seconds = call
        .get_f64("seconds")
        .filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| PilotError::malformed("'wait' needs a non-negative 'seconds'"))?;
    browser(
        BrowserAction::Wait {
            seconds: seconds.min(MAX_WAIT_SECS),
        },
        None,
    )
}

fn query_dom_handler(call: &ToolCall) -> Result<Invocation> {
    let query = non_empty(call, "query")?;
    let limit = call
        .arguments
        .get("limit")
        .and_then(integer_value)
        .filter(|l| *l > 0)
        .map(|l| l as usize);
    Ok(Invocation::QueryDom { query, limit })
}
