//! Error types for webpilot
//!
//! One enum carries both the run-level failure taxonomy (what the loop
//! branches on) and the plumbing errors that bubble up from IO, HTTP and
//! serialization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a collaborator failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The page may settle; retrying can help
    Transient,
    /// Retrying the same operation will not help
    Permanent,
}

/// Main error type for webpilot operations
#[derive(Error, Debug)]
pub enum PilotError {
    /// Element not yet present, navigation in progress, action intercepted
    #[error("Transient tool failure: {0}")]
    TransientToolFailure(String),

    /// No candidate matched the target description, or every locator was used up
    #[error("Could not resolve '{target}': {reason}")]
    SelectorResolution { target: String, reason: String },

    /// Reasoning service unreachable, timed out or answered with an error
    #[error("Reasoning service error: {message}")]
    ReasoningService { message: String, recoverable: bool },

    /// Reply could not be turned into a valid intent
    #[error("Malformed intent: {0}")]
    MalformedIntent(String),

    /// Step or wall-clock budget exhausted
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A suspension point ran past its deadline
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// User abort
    #[error("Run cancelled")]
    Cancelled,

    /// Browser collaborator errors
    #[error("Browser error: {message}")]
    Browser { kind: FailureKind, message: String },

    /// Agent-browser not installed
    #[error("agent-browser not found. Install with: npm install -g agent-browser && agent-browser install")]
    AgentBrowserNotFound,

    /// Tool table is inconsistent
    #[error("Tool registry error: {0}")]
    Registry(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for webpilot operations
pub type Result<T> = std::result::Result<T, PilotError>;

impl PilotError {
    /// Create a transient browser error
    pub fn browser_transient(msg: impl Into<String>) -> Self {
        Self::Browser {
            kind: FailureKind::Transient,
            message: msg.into(),
        }
    }

    /// Create a permanent browser error
    pub fn browser_permanent(msg: impl Into<String>) -> Self {
        Self::Browser {
            kind: FailureKind::Permanent,
            message: msg.into(),
        }
    }

    /// Create a reasoning service error
    pub fn reasoning(msg: impl Into<String>, recoverable: bool) -> Self {
        Self::ReasoningService {
            message: msg.into(),
            recoverable,
        }
    }

    /// Create a selector resolution error
    pub fn unresolved(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SelectorResolution {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed intent error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedIntent(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a registry error
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Failures the recovery ladder is allowed to absorb
    pub fn is_recoverable_by_ladder(&self) -> bool {
        match self {
            Self::TransientToolFailure(_) | Self::SelectorResolution { .. } | Self::Timeout(_) => {
                true
            }
            Self::Browser { kind, .. } => *kind == FailureKind::Transient,
            _ => false,
        }
    }

    /// Failures that end the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BudgetExceeded(_)
                | Self::Cancelled
                | Self::AgentBrowserNotFound
                | Self::ReasoningService {
                    recoverable: false,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_classification() {
        assert!(PilotError::TransientToolFailure("not visible".into()).is_recoverable_by_ladder());
        assert!(PilotError::unresolved("Search box", "no candidates").is_recoverable_by_ladder());
        assert!(PilotError::browser_transient("timeout").is_recoverable_by_ladder());
        assert!(!PilotError::browser_permanent("crashed").is_recoverable_by_ladder());
        assert!(!PilotError::malformed("no tool").is_recoverable_by_ladder());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PilotError::BudgetExceeded("50 steps".into()).is_fatal());
        assert!(PilotError::Cancelled.is_fatal());
        assert!(PilotError::reasoning("bad protocol", false).is_fatal());
        assert!(!PilotError::reasoning("connection refused", true).is_fatal());
        assert!(!PilotError::malformed("unknown tool").is_fatal());
    }
}
