//! Confirmation gate for risky actions
//!
//! The orchestrator blocks on a gate before dispatching anything the policy
//! classifier flags. The gate only answers yes or no; deadlines and
//! cancellation are applied around it by the caller.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::core::text::truncate_chars;
use crate::core::{PolicyDecision, RiskTier, ToolCall};

/// What the user is asked to approve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub action: String,
    pub tier: RiskTier,
    pub reason: String,
}

impl ConfirmationRequest {
    pub fn new(call: &ToolCall, decision: &PolicyDecision) -> Self {
        Self {
            action: describe_action(call),
            tier: decision.tier,
            reason: decision.reason.clone(),
        }
    }

    /// Prompt text shown to a human
    pub fn render(&self) -> String {
        format!(
            "Action: {}\nRisk: {}\nReason: {}\n\nDo you want to proceed with this action?",
            self.action, self.tier, self.reason
        )
    }
}

/// Human-readable description of a tool call
pub fn describe_action(call: &ToolCall) -> String {
    let target = call.target().unwrap_or_else(|| "unknown".to_string());
    match call.name.as_str() {
        "click" => format!("Click on element: {}", target),
        "hover" => format!("Hover over element: {}", target),
        "type_text" => {
            let text = call.get_string("text").unwrap_or_default();
            format!("Type '{}' into {}", truncate_chars(&text, 30, "..."), target)
        }
        "press" => format!(
            "Press key: {}",
            call.get_string("keys").unwrap_or_else(|| "unknown".to_string())
        ),
        "navigate_to_url" => format!(
            "Open URL: {}",
            call.get_string("url").unwrap_or_else(|| "unknown".to_string())
        ),
        _ => format!("{}({})", call.name, call.arguments),
    }
}

/// Source of yes/no answers for risky actions
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// `true` only on explicit approval
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Asks on the controlling terminal
///
/// Answers come from one long-lived reader thread, so a prompt abandoned
/// on timeout or cancellation leaves nothing blocked on stdin. Lines typed
/// while no prompt is open are discarded. Anything other than an explicit
/// yes declines, including EOF.
#[derive(Debug, Default)]
pub struct TerminalGate {
    answers: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl TerminalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate reading answers from `lines` instead of stdin
    pub fn from_lines(lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            answers: Mutex::new(Some(lines)),
        }
    }
}

/// Forward stdin lines until EOF or until nobody listens
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("webpilot-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Could not start the terminal reader; confirmations will be declined");
    }
    rx
}

#[async_trait]
impl ConfirmationGate for TerminalGate {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        let mut guard = self.answers.lock().await;
        let answers = guard.get_or_insert_with(spawn_stdin_reader);
        while answers.try_recv().is_ok() {}

        let mut stdout = io::stdout();
        let _ = writeln!(stdout, "\n{}", request.render());
        let _ = write!(stdout, "[y/N] ");
        let _ = stdout.flush();

        match answers.recv().await {
            Some(line) => is_yes(&line),
            None => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "да" | "д"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    #[test]
    fn test_describe_type_text_truncates() {
        let call = ToolCall::new(
            "type_text",
            json!({"target": "Message box", "text": "This message is definitely longer than thirty characters"}),
        );
        assert_eq!(
            describe_action(&call),
            "Type 'This message is definitely ...' into Message box"
        );
    }

    #[test]
    fn test_describe_click_and_press() {
        let click = ToolCall::new("click", json!({"target": "Delete account"}));
        assert_eq!(describe_action(&click), "Click on element: Delete account");
        let press = ToolCall::new("press", json!({"keys": "Enter"}));
        assert_eq!(describe_action(&press), "Press key: Enter");
    }

    #[test]
    fn test_render_request() {
        let decision = PolicyDecision {
            tier: RiskTier::Destructive,
            reason: "Deletes content".to_string(),
            requires_confirmation: true,
            rule: Some("deletion".to_string()),
        };
        let call = ToolCall::new("click", json!({"target": "Trash"}));
        let text = ConfirmationRequest::new(&call, &decision).render();
        assert!(text.starts_with("Action: Click on element: Trash\nRisk: destructive\nReason: Deletes content"));
    }

    fn delete_request() -> ConfirmationRequest {
        ConfirmationRequest {
            action: "Click on element: Delete".to_string(),
            tier: RiskTier::Destructive,
            reason: "Deletes content".to_string(),
        }
    }

    #[tokio::test]
    async fn test_abandoned_prompt_keeps_next_answer() {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = TerminalGate::from_lines(rx);
        let request = delete_request();

        let abandoned = tokio::time::timeout(Duration::from_millis(20), gate.confirm(&request)).await;
        assert!(abandoned.is_err());

        let (approved, _) = tokio::join!(gate.confirm(&request), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send("y".to_string()).unwrap();
        });
        assert!(approved);
    }

    #[tokio::test]
    async fn test_stale_answer_is_discarded() {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = TerminalGate::from_lines(rx);
        tx.send("yes".to_string()).unwrap();

        let request = delete_request();
        let (approved, _) = tokio::join!(gate.confirm(&request), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send("n".to_string()).unwrap();
        });
        assert!(!approved);
    }

    #[tokio::test]
    async fn test_closed_input_declines() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let gate = TerminalGate::from_lines(rx);
        drop(tx);
        assert!(!gate.confirm(&delete_request()).await);
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("sure"));
    }
}
