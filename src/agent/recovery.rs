//! Recovery ladder for failed actions
//!
//! A controller lives for exactly one intent. Each failure of that intent
//! asks it for the next rung; rungs come out in a fixed order, each at most
//! once, and the cursor never moves backwards. Rungs that cannot help with
//! the current failure are skipped, never reordered.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::PilotError;

/// One remediation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rung {
    /// Let the page settle, re-observe, retry the same locator
    WaitAndRecheck,
    /// Bring the target into view, re-observe, retry
    ScrollIntoView,
    /// Close a modal or popup, re-observe, retry
    DismissOverlay,
    /// Retry with the next-ranked locator
    NextCandidate,
    /// Record a failed step and return to planning
    GiveUp,
}

impl Rung {
    pub fn name(&self) -> &'static str {
        match self {
            Rung::WaitAndRecheck => "wait",
            Rung::ScrollIntoView => "scroll",
            Rung::DismissOverlay => "dismiss overlay",
            Rung::NextCandidate => "next candidate",
            Rung::GiveUp => "give up",
        }
    }
}

impl fmt::Display for Rung {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const LADDER: [Rung; 4] = [
    Rung::WaitAndRecheck,
    Rung::ScrollIntoView,
    Rung::DismissOverlay,
    Rung::NextCandidate,
];

/// Coarse reading of a failure message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    NotFound,
    Obscured,
    Navigation,
    Other,
}

/// Classify a failure by its message text
pub fn classify_failure(message: &str) -> FailureClass {
    const NOT_FOUND: [&str; 6] = [
        "not found",
        "no element",
        "timeout",
        "timed out",
        "waiting for selector",
        "could not resolve",
    ];
    const OBSCURED: [&str; 5] = [
        "not visible",
        "intercept",
        "obscured",
        "covered",
        "outside of the viewport",
    ];
    const NAVIGATION: [&str; 3] = ["navigation", "net::", "err_"];

    let lower = message.to_lowercase();
    if NOT_FOUND.iter().any(|kw| lower.contains(kw)) {
        FailureClass::NotFound
    } else if OBSCURED.iter().any(|kw| lower.contains(kw)) {
        FailureClass::Obscured
    } else if NAVIGATION.iter().any(|kw| lower.contains(kw)) {
        FailureClass::Navigation
    } else {
        FailureClass::Other
    }
}

/// Escalation state for a single intent
#[derive(Debug, Clone)]
pub struct RecoveryController {
    /// The intent addresses a page element
    has_target: bool,
    cursor: usize,
    attempted: Vec<Rung>,
}

impl RecoveryController {
    pub fn new(has_target: bool) -> Self {
        Self {
            has_target,
            cursor: 0,
            attempted: Vec::new(),
        }
    }

    /// Choose the remediation for `failure`
    ///
    /// `remaining_candidates` is the number of locators ranked below the one
    /// that just failed. Failures the ladder cannot absorb give up at once.
    pub fn next_rung(&mut self, failure: &PilotError, remaining_candidates: usize) -> Rung {
        if !failure.is_recoverable_by_ladder() {
            self.cursor = LADDER.len();
            return Rung::GiveUp;
        }

        let class = classify_failure(&failure.to_string());
        while let Some(&rung) = LADDER.get(self.cursor) {
            self.cursor += 1;
            if self.applies(rung, class, remaining_candidates) {
                self.attempted.push(rung);
                return rung;
            }
        }
        Rung::GiveUp
    }

    fn applies(&self, rung: Rung, class: FailureClass, remaining_candidates: usize) -> bool {
        match rung {
            Rung::WaitAndRecheck => true,
            Rung::ScrollIntoView => self.has_target && class != FailureClass::Navigation,
            Rung::DismissOverlay => class != FailureClass::Navigation,
            Rung::NextCandidate => {
                self.has_target && remaining_candidates > 0 && class != FailureClass::Navigation
            }
            Rung::GiveUp => false,
        }
    }

    /// Rungs handed out so far, in order
    pub fn attempted(&self) -> &[Rung] {
        &self.attempted
    }

    /// Number of remediation attempts made for this intent
    pub fn attempts(&self) -> usize {
        self.attempted.len()
    }
}
