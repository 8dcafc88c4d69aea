//! Browser collaborator contract
//!
//! The orchestrator only talks to the page through `BrowserDriver`. Every
//! failure carries a transient/permanent kind via `PilotError::Browser` so
//! the recovery ladder can tell retryable problems apart.

use std::path::Path;

use async_trait::async_trait;

use crate::core::{Candidate, Locator, Observation, Result, ToolResult};

/// A concrete page action, arguments included
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserAction {
    Navigate { url: String },
    Click,
    TypeText { text: String, clear: bool },
    Press { keys: String },
    /// Scroll the page; positive is down
    Scroll { amount: i64 },
    /// Bring the located element into view
    ScrollIntoView,
    Wait { seconds: f64 },
    Hover,
    Back,
    ClosePopups,
    CurrentUrl,
}

impl BrowserAction {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserAction::Navigate { .. } => "navigate",
            BrowserAction::Click => "click",
            BrowserAction::TypeText { .. } => "type_text",
            BrowserAction::Press { .. } => "press",
            BrowserAction::Scroll { .. } => "scroll",
            BrowserAction::ScrollIntoView => "scroll_into_view",
            BrowserAction::Wait { .. } => "wait",
            BrowserAction::Hover => "hover",
            BrowserAction::Back => "back",
            BrowserAction::ClosePopups => "close_popups",
            BrowserAction::CurrentUrl => "get_current_url",
        }
    }

    /// Whether dispatch needs a resolved element
    pub fn needs_locator(&self) -> bool {
        matches!(
            self,
            BrowserAction::Click
                | BrowserAction::TypeText { .. }
                | BrowserAction::Hover
                | BrowserAction::ScrollIntoView
        )
    }
}

/// Page automation primitives used by the orchestrator
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Start the browser context, optionally on a first page
    async fn open(&self, start_url: Option<&str>) -> Result<()>;

    /// Capture page state; writes a screenshot when a path is given
    async fn observe(&self, screenshot: Option<&Path>, max_text_chars: usize) -> Result<Observation>;

    /// Elements that may match a natural-language description, in document order
    async fn query(&self, target: &str, limit: usize) -> Result<Vec<Candidate>>;

    /// Perform one action, against `locator` when the action needs one
    async fn dispatch(&self, action: &BrowserAction, locator: Option<&Locator>) -> Result<ToolResult>;

    /// Save a screenshot and return its reference
    async fn screenshot(&self, path: &Path) -> Result<String>;

    /// Tear down the browser context
    async fn close(&self) -> Result<()>;
}
