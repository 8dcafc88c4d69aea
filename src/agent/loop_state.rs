//! Agent loop state management
//!
//! Tracks which state the orchestration loop is in and enforces the step
//! and wall-clock budgets.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::{PilotError, Result};

/// States of the orchestration loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Init,
    Observing,
    Planning,
    AwaitingConfirmation,
    Acting,
    Recovering,
    Completed,
    Failed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Completed | LoopState::Failed)
    }

    /// Whether the loop may move from `self` to `next`
    pub fn can_transition_to(&self, next: LoopState) -> bool {
        use LoopState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Init, Observing)
                | (Observing, Planning)
                | (Planning, AwaitingConfirmation)
                | (Planning, Acting)
                | (Planning, Recovering)
                | (Planning, Completed)
                | (AwaitingConfirmation, Acting)
                | (AwaitingConfirmation, Planning)
                | (Acting, Observing)
                | (Acting, Recovering)
                | (Recovering, Acting)
                | (Recovering, Planning)
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Init => "init",
            LoopState::Observing => "observing",
            LoopState::Planning => "planning",
            LoopState::AwaitingConfirmation => "awaiting_confirmation",
            LoopState::Acting => "acting",
            LoopState::Recovering => "recovering",
            LoopState::Completed => "completed",
            LoopState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current loop state plus the budgets that end a run
#[derive(Debug, Clone)]
pub struct AgentLoopState {
    state: LoopState,
    /// Steps recorded so far
    pub steps: usize,
    /// Step budget
    pub max_steps: usize,
    started: Instant,
    max_duration: Option<Duration>,
}

impl AgentLoopState {
    pub fn new(max_steps: usize, max_duration: Option<Duration>) -> Self {
        Self {
            state: LoopState::Init,
            steps: 0,
            max_steps,
            started: Instant::now(),
            max_duration,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: LoopState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PilotError::Other(format!(
                "invalid loop transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "Loop transition");
        self.state = next;
        Ok(())
    }

    /// Count a recorded step
    pub fn step_recorded(&mut self) {
        self.steps += 1;
    }

    /// Fail once either budget is spent
    pub fn check_budget(&self) -> Result<()> {
        if self.steps >= self.max_steps {
            return Err(PilotError::BudgetExceeded(format!(
                "step budget of {} exhausted",
                self.max_steps
            )));
        }
        if let Some(limit) = self.max_duration {
            if self.started.elapsed() >= limit {
                return Err(PilotError::BudgetExceeded(format!(
                    "time budget of {}s exhausted",
                    limit.as_secs()
                )));
            }
        }
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
