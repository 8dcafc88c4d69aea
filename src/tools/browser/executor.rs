//! Browser executor - wraps agent-browser CLI
//!
//! Implements `BrowserDriver` on top of agent-browser commands. Element
//! actions take the CSS selector produced by the synthesizer.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::config::BrowserConfig;
use crate::core::text::summarize_at_sentence;
use crate::core::{Candidate, Locator, Observation, PilotError, Result, ToolResult};
use crate::tools::browser::dom::{
    close_popups_script, parse_eval_output, query_script, PageState, RawElement,
    PAGE_STATE_SCRIPT,
};
use crate::tools::browser::driver::{BrowserAction, BrowserDriver};

/// Longest wait a single `wait` action may request
pub const MAX_WAIT_SECS: f64 = 10.0;

/// stderr fragments that mean retrying will not help
const PERMANENT_MARKERS: [&str; 6] = [
    "browser has been closed",
    "target closed",
    "crashed",
    "unknown command",
    "invalid argument",
    "executable doesn't exist",
];

/// Decide whether an agent-browser failure is worth retrying
pub fn classify_stderr(stderr: &str) -> PilotError {
    let message = stderr.trim();
    let lower = message.to_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        PilotError::browser_permanent(message)
    } else {
        PilotError::browser_transient(message)
    }
}

/// Executor for browser automation via agent-browser CLI
pub struct AgentBrowser {
    /// Session name for isolation
    session_name: String,
    /// Whether to run in headed mode
    headed: bool,
    /// Persistent profile directory, if any
    profile_dir: Option<PathBuf>,
    scroll_step: i64,
}

impl AgentBrowser {
    /// Create a new browser executor
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            headed: false,
            profile_dir: None,
            scroll_step: 600,
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            session_name: config.session_name.clone(),
            headed: config.headed,
            profile_dir: config.profile_dir.clone(),
            scroll_step: config.scroll_step,
        }
    }

    /// Check if agent-browser is installed
    pub async fn is_available() -> bool {
        Command::new("agent-browser")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["--session".to_string(), self.session_name.clone()];
        if self.headed {
            args.push("--headed".to_string());
        }
        if let Some(dir) = &self.profile_dir {
            args.push("--profile".to_string());
            args.push(dir.display().to_string());
        }
        args
    }

    /// Run an agent-browser command
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("agent-browser");
        cmd.args(self.base_args());
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(command = ?args.first(), "agent-browser");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PilotError::AgentBrowserNotFound
            } else {
                PilotError::browser_permanent(format!("Failed to run agent-browser: {}", e))
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            Err(classify_stderr(&detail))
        }
    }

    async fn eval(&self, script: &str) -> Result<String> {
        self.run_command(&["eval", script]).await
    }

    async fn get(&self, what: &str) -> Result<String> {
        self.run_command(&["get", what])
            .await
            .map(|s| s.trim().to_string())
    }

    fn selector<'a>(action: &BrowserAction, locator: Option<&'a Locator>) -> Result<&'a str> {
        locator.map(|l| l.selector.as_str()).ok_or_else(|| {
            PilotError::Other(format!("'{}' needs a resolved element", action.name()))
        })
    }
}

impl Default for AgentBrowser {
    fn default() -> Self {
        Self::new("webpilot")
    }
}

#[async_trait]
impl BrowserDriver for AgentBrowser {
    async fn open(&self, start_url: Option<&str>) -> Result<()> {
        let url = start_url.unwrap_or("about:blank");
        self.run_command(&["open", url]).await?;
        Ok(())
    }

    async fn observe(&self, screenshot: Option<&Path>, max_text_chars: usize) -> Result<Observation> {
        let url = self.get("url").await?;
        let title = self.get("title").await.unwrap_or_default();

        let state = match self.eval(PAGE_STATE_SCRIPT).await {
            Ok(raw) => parse_eval_output::<PageState>(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Page state script returned unusable output");
                PageState::default()
            }),
            Err(e) => {
                warn!(error = %e, "Page state script failed");
                PageState::default()
            }
        };

        let screenshot = match screenshot {
            Some(path) => match self.screenshot(path).await {
                Ok(reference) => Some(reference),
                Err(e) => {
                    warn!(error = %e, "Screenshot failed");
                    None
                }
            },
            None => None,
        };

        Ok(Observation {
            url,
            title,
            text_summary: summarize_at_sentence(&state.text, max_text_chars),
            screenshot,
            has_input_focused: state.input_focused,
            scroll_y: state.scroll_y,
            page_height: state.page_height,
            captured_at: Utc::now(),
        })
    }

    async fn query(&self, target: &str, limit: usize) -> Result<Vec<Candidate>> {
        let raw = self.eval(&query_script(target, limit)).await?;
        let elements: Vec<RawElement> = parse_eval_output(&raw)?;
        Ok(elements.into_iter().map(RawElement::into_candidate).collect())
    }

    async fn dispatch(&self, action: &BrowserAction, locator: Option<&Locator>) -> Result<ToolResult> {
        let name = action.name();
        let result = match action {
            BrowserAction::Navigate { url } => {
                self.run_command(&["open", url]).await?;
                // Best effort; some pages never go idle
                let _ = self.run_command(&["wait", "--load", "networkidle"]).await;
                ToolResult::success(name, format!("Navigated to {}", url))
            }
            BrowserAction::Click => {
                let sel = Self::selector(action, locator)?;
                self.run_command(&["click", sel]).await?;
                ToolResult::success(name, format!("Clicked {}", sel))
            }
            BrowserAction::TypeText { text, clear } => {
                let sel = Self::selector(action, locator)?;
                let verb = if *clear { "fill" } else { "type" };
                self.run_command(&[verb, sel, text]).await?;
                ToolResult::success(name, format!("Typed '{}' into {}", text, sel))
            }
            BrowserAction::Press { keys } => {
                self.run_command(&["press", keys]).await?;
                ToolResult::success(name, format!("Pressed {}", keys))
            }
            BrowserAction::Scroll { amount } => {
                let direction = if *amount < 0 { "up" } else { "down" };
                let pixels = if *amount == 0 {
                    self.scroll_step.to_string()
                } else {
                    amount.unsigned_abs().to_string()
                };
                self.run_command(&["scroll", direction, &pixels]).await?;
                ToolResult::success(name, format!("Scrolled {} {}px", direction, pixels))
            }
            BrowserAction::ScrollIntoView => {
                let sel = Self::selector(action, locator)?;
                self.run_command(&["scrollintoview", sel]).await?;
                ToolResult::success(name, format!("Scrolled {} into view", sel))
            }
            BrowserAction::Wait { seconds } => {
                let seconds = seconds.clamp(0.0, MAX_WAIT_SECS);
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                ToolResult::success(name, format!("Waited {:.1}s", seconds))
            }
            BrowserAction::Hover => {
                let sel = Self::selector(action, locator)?;
                self.run_command(&["hover", sel]).await?;
                ToolResult::success(name, format!("Hovered over {}", sel))
            }
            BrowserAction::Back => {
                self.run_command(&["back"]).await?;
                ToolResult::success(name, "Went back")
            }
            BrowserAction::ClosePopups => {
                let raw = self.eval(&close_popups_script()).await?;
                let clicked: usize = parse_eval_output(&raw).unwrap_or(0);
                let _ = self.run_command(&["press", "Escape"]).await;
                ToolResult::success(name, format!("Closed {} popup(s)", clicked))
            }
            BrowserAction::CurrentUrl => {
                let url = self.get("url").await?;
                ToolResult::success_with_data(
                    name,
                    format!("Current URL: {}", url),
                    serde_json::json!({ "url": url }),
                )
            }
        };
        Ok(result)
    }

    async fn screenshot(&self, path: &Path) -> Result<String> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let reference = path.display().to_string();
        self.run_command(&["screenshot", &reference]).await?;
        Ok(reference)
    }

    async fn close(&self) -> Result<()> {
        self.run_command(&["close"]).await?;
        Ok(())
    }
}
