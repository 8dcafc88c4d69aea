//! Bounded task memory
//!
//! Keeps the most recent steps verbatim and folds everything older into a
//! single running summary. The summary is lossy (action, target and outcome
//! only) but always keeps the total count and the outcome tallies, so the
//! reasoning context stays bounded for any run length.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::text::truncate_chars;
use crate::core::{Observation, Step, StepOutcome};

/// Longest target description kept in a summary digest
const DIGEST_TARGET_CHARS: usize = 60;

/// Longest result text kept for a verbatim entry
const VERBATIM_SUMMARY_CHARS: usize = 300;

/// Whether an entry is a full step or the summary of older ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Verbatim,
    Summary,
}

/// One item of reasoning context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub kind: EntryKind,
    /// First step index covered, inclusive
    pub first_index: usize,
    /// Last step index covered, inclusive
    pub last_index: usize,
    pub text: String,
}

impl MemoryEntry {
    pub fn steps_covered(&self) -> usize {
        self.last_index + 1 - self.first_index
    }
}

/// Running totals for evicted steps
#[derive(Debug, Clone, Default)]
struct Summary {
    first_index: usize,
    last_index: usize,
    total: usize,
    succeeded: usize,
    failed: usize,
    rejected: usize,
    per_tool: BTreeMap<String, usize>,
    /// Most recent distinct attempts, oldest first
    attempts: VecDeque<String>,
}

impl Summary {
    fn fold(&mut self, step: &Step, detail: usize) {
        if self.total == 0 {
            self.first_index = step.index;
        }
        self.last_index = step.index;
        self.total += 1;
        match step.outcome {
            StepOutcome::Succeeded => self.succeeded += 1,
            StepOutcome::Failed => self.failed += 1,
            StepOutcome::Rejected => self.rejected += 1,
        }
        *self.per_tool.entry(step.intent.name.clone()).or_insert(0) += 1;

        let digest = match step.target() {
            Some(target) => format!(
                "{} '{}' -> {}",
                step.intent.name,
                truncate_chars(&target, DIGEST_TARGET_CHARS, "..."),
                step.outcome
            ),
            None => format!("{} -> {}", step.intent.name, step.outcome),
        };
        // Repeats move to the back so the window favours distinct attempts
        self.attempts.retain(|a| a != &digest);
        self.attempts.push_back(digest);
        while self.attempts.len() > detail {
            self.attempts.pop_front();
        }
    }

    fn entry(&self) -> MemoryEntry {
        let tools: Vec<String> = self
            .per_tool
            .iter()
            .map(|(tool, n)| format!("{} x{}", tool, n))
            .collect();

        let mut text = format!(
            "Steps {}-{} summarized ({} total: {} succeeded, {} failed, {} rejected). Actions: {}.",
            self.first_index + 1,
            self.last_index + 1,
            self.total,
            self.succeeded,
            self.failed,
            self.rejected,
            tools.join(", ")
        );
        if !self.attempts.is_empty() {
            text.push_str(" Already tried: ");
            text.push_str(&self.attempts.iter().cloned().collect::<Vec<_>>().join("; "));
            text.push('.');
        }

        MemoryEntry {
            kind: EntryKind::Summary,
            first_index: self.first_index,
            last_index: self.last_index,
            text,
        }
    }
}

/// Everything the reasoning service sees about the run so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    pub task: String,
    pub summary: Option<MemoryEntry>,
    /// Oldest first
    pub verbatim: Vec<MemoryEntry>,
    pub observation: Observation,
}

impl MemoryContext {
    /// Summary first, then the verbatim tail
    pub fn entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.summary.iter().chain(self.verbatim.iter())
    }
}

/// Two-tier step memory for one run
#[derive(Debug, Clone)]
pub struct Memory {
    task: String,
    window: usize,
    detail: usize,
    tail: VecDeque<Step>,
    summary: Option<Summary>,
}

impl Memory {
    /// `window` steps stay verbatim; the summary remembers `detail` distinct attempts
    pub fn new(task: impl Into<String>, window: usize, detail: usize) -> Self {
        Self {
            task: task.into(),
            window: window.max(1),
            detail: detail.max(1),
            tail: VecDeque::new(),
            summary: None,
        }
    }

    /// Record a completed step, evicting the oldest verbatim one if full
    pub fn record(&mut self, step: Step) {
        self.tail.push_back(step);
        while self.tail.len() > self.window {
            if let Some(evicted) = self.tail.pop_front() {
                self.summary
                    .get_or_insert_with(Summary::default)
                    .fold(&evicted, self.detail);
            }
        }
    }

    /// Steps currently kept verbatim
    pub fn verbatim_len(&self) -> usize {
        self.tail.len()
    }

    /// Steps seen so far, summarized or not
    pub fn total_steps(&self) -> usize {
        self.tail.len() + self.summary.as_ref().map(|s| s.total).unwrap_or(0)
    }

    /// Build the context for the next planning call
    pub fn context(&self, observation: &Observation) -> MemoryContext {
        MemoryContext {
            task: self.task.clone(),
            summary: self.summary.as_ref().map(Summary::entry),
            verbatim: self.tail.iter().map(verbatim_entry).collect(),
            observation: observation.clone(),
        }
    }
}

fn verbatim_entry(step: &Step) -> MemoryEntry {
    let mut text = format!(
        "Step {}: {}({}) -> {}: {}",
        step.index + 1,
        step.intent.name,
        step.intent.arguments,
        step.outcome,
        truncate_chars(&step.summary, VERBATIM_SUMMARY_CHARS, "...")
    );
    if let Some(locator) = &step.locator {
        text.push_str(&format!(" [via {}]", locator));
    }
    if !step.diagnostics.is_empty() {
        text.push_str(&format!(" (notes: {})", step.diagnostics.join("; ")));
    }

    MemoryEntry {
        kind: EntryKind::Verbatim,
        first_index: step.index,
        last_index: step.index,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PendingStep, ToolCall};
    use serde_json::json;

    fn step(index: usize, target: &str, outcome: StepOutcome) -> Step {
        Step::from_pending(
            index,
            PendingStep::new(
                ToolCall::new("click", json!({ "target": target })),
                outcome,
                "done",
            ),
        )
    }

    #[test]
    fn test_tail_never_exceeds_window() {
        let mut memory = Memory::new("task", 3, 5);
        for i in 0..50 {
            memory.record(step(i, "Next", StepOutcome::Succeeded));
            assert!(memory.verbatim_len() <= 3);
        }
        assert_eq!(memory.total_steps(), 50);
    }

    #[test]
    fn test_no_summary_until_eviction() {
        let mut memory = Memory::new("task", 2, 5);
        memory.record(step(0, "A", StepOutcome::Succeeded));
        memory.record(step(1, "B", StepOutcome::Succeeded));
        let ctx = memory.context(&Observation::blank("about:blank", ""));
        assert!(ctx.summary.is_none());
        assert_eq!(ctx.verbatim.len(), 2);
        assert_eq!(ctx.verbatim[0].first_index, 0);
    }

    #[test]
    fn test_summary_covers_evicted_steps() {
        let mut memory = Memory::new("Find the docs", 5, 4);
        for i in 0..20 {
            let outcome = if i % 5 == 0 {
                StepOutcome::Failed
            } else {
                StepOutcome::Succeeded
            };
            memory.record(step(i, &format!("Link {}", i % 3), outcome));
        }

        let ctx = memory.context(&Observation::blank("https://x.test", "X"));
        let summary = ctx.summary.clone().unwrap();
        assert_eq!(ctx.verbatim.len(), 5);
        assert_eq!(summary.kind, EntryKind::Summary);
        assert_eq!(summary.first_index, 0);
        assert_eq!(summary.last_index, 14);
        assert_eq!(summary.steps_covered(), 15);
        assert!(summary.text.contains("15 total: 12 succeeded, 3 failed, 0 rejected"));
        assert!(summary.text.contains("click x15"));
        assert_eq!(ctx.verbatim[0].first_index, 15);
        assert_eq!(ctx.entries().count(), 6);
    }

    #[test]
    fn test_summary_remembers_distinct_attempts() {
        let mut memory = Memory::new("task", 1, 2);
        memory.record(step(0, "Buy", StepOutcome::Rejected));
        memory.record(step(1, "Search", StepOutcome::Failed));
        memory.record(step(2, "Buy", StepOutcome::Rejected));
        memory.record(step(3, "Menu", StepOutcome::Succeeded));

        let summary = memory
            .context(&Observation::blank("about:blank", ""))
            .summary
            .unwrap();
        assert!(summary.text.contains("click 'Search' -> failed; click 'Buy' -> rejected"));
        assert!(summary.text.contains("(3 total: 0 succeeded, 1 failed, 2 rejected)"));
    }

    #[test]
    fn test_verbatim_entry_text() {
        let mut memory = Memory::new("task", 2, 2);
        let pending = PendingStep::new(
            ToolCall::new("click", json!({ "target": "Login" })),
            StepOutcome::Succeeded,
            "Clicked",
        )
        .with_diagnostic("recovered via scroll");
        memory.record(Step::from_pending(0, pending));

        let ctx = memory.context(&Observation::blank("about:blank", ""));
        let text = &ctx.verbatim[0].text;
        assert!(text.starts_with("Step 1: click("));
        assert!(text.contains("succeeded: Clicked"));
        assert!(text.contains("recovered via scroll"));
    }
}
