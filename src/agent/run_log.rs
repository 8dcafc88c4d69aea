//! Run log and run artifacts
//!
//! `RunContext` is threaded through one run: it owns the step counter, the
//! in-memory `RunLog` and the sink that persists it. Steps get their index
//! here and nowhere else, which keeps indices contiguous from 0.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::core::{PendingStep, Result, Step, StepOutcome, Task, TokenUsage};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// One line of `logs.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub step: usize,
    pub tool: String,
    pub args: serde_json::Value,
    pub result: String,
    pub success: bool,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl From<&Step> for LogRecord {
    fn from(step: &Step) -> Self {
        Self {
            timestamp: step.timestamp,
            step: step.index,
            tool: step.intent.name.clone(),
            args: step.intent.arguments.clone(),
            result: step.summary.clone(),
            success: step.outcome == StepOutcome::Succeeded,
            outcome: step.outcome,
            locator: step.locator.as_ref().map(|l| l.selector.clone()),
            confirmed: step.confirmed,
            diagnostics: step.diagnostics.clone(),
        }
    }
}

/// Written once when a run ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub task: String,
    pub status: RunStatus,
    pub summary: String,
    pub steps: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub token_usage: TokenUsage,
}

/// Persistence for run records
pub trait LogSink: Send {
    /// Append one step record
    fn append(&mut self, record: &LogRecord) -> Result<()>;

    /// Where the screenshot for the given observation should be written
    fn screenshot_path(&mut self, observation: usize) -> Option<PathBuf>;

    /// Close out the run
    fn finish(&mut self, metadata: &RunMetadata) -> Result<()>;
}

/// Run directory with `logs.jsonl`, `run.json` and `screenshots/`
pub struct JsonlRunLog {
    run_dir: PathBuf,
    screenshots_dir: Option<PathBuf>,
    writer: BufWriter<File>,
}

impl JsonlRunLog {
    /// Create `<runs_dir>/<YYYYmmdd_HHMMSS>`, suffixed if that already exists
    pub fn create(runs_dir: &Path, started_at: DateTime<Utc>, screenshots: bool) -> Result<Self> {
        let stamp = started_at.format("%Y%m%d_%H%M%S").to_string();
        let mut run_dir = runs_dir.join(&stamp);
        let mut n = 1;
        while run_dir.exists() {
            run_dir = runs_dir.join(format!("{}_{}", stamp, n));
            n += 1;
        }
        fs::create_dir_all(&run_dir)?;

        let screenshots_dir = if screenshots {
            let dir = run_dir.join("screenshots");
            fs::create_dir_all(&dir)?;
            Some(dir)
        } else {
            None
        };

        let file = File::create(run_dir.join("logs.jsonl"))?;
        Ok(Self {
            run_dir,
            screenshots_dir,
            writer: BufWriter::new(file),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl LogSink for JsonlRunLog {
    fn append(&mut self, record: &LogRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn screenshot_path(&mut self, observation: usize) -> Option<PathBuf> {
        self.screenshots_dir
            .as_ref()
            .map(|dir| dir.join(format!("step_{:04}.png", observation)))
    }

    fn finish(&mut self, metadata: &RunMetadata) -> Result<()> {
        self.writer.flush()?;
        let content = serde_json::to_string_pretty(metadata)?;
        fs::write(self.run_dir.join("run.json"), content)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryLogState {
    records: Vec<LogRecord>,
    metadata: Option<RunMetadata>,
}

/// Keeps records in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryRunLog {
    inner: Arc<Mutex<MemoryLogState>>,
}

impl MemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().records.clone()
    }

    pub fn metadata(&self) -> Option<RunMetadata> {
        self.lock().metadata.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLogState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogSink for MemoryRunLog {
    fn append(&mut self, record: &LogRecord) -> Result<()> {
        self.lock().records.push(record.clone());
        Ok(())
    }

    fn screenshot_path(&mut self, _observation: usize) -> Option<PathBuf> {
        None
    }

    fn finish(&mut self, metadata: &RunMetadata) -> Result<()> {
        self.lock().metadata = Some(metadata.clone());
        Ok(())
    }
}

/// Append-only record of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: Uuid,
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<Step>,
    pub token_usage: TokenUsage,
}

/// Per-run state shared by every component call
pub struct RunContext {
    log: RunLog,
    sink: Box<dyn LogSink>,
    observations: usize,
}

impl RunContext {
    pub fn new(task: &Task, sink: Box<dyn LogSink>) -> Self {
        Self {
            log: RunLog {
                run_id: task.run_id,
                task: task.goal.clone(),
                started_at: task.created_at,
                steps: Vec::new(),
                token_usage: TokenUsage::default(),
            },
            sink,
            observations: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.log.run_id
    }

    pub fn steps(&self) -> &[Step] {
        &self.log.steps
    }

    /// Index the next recorded step will get
    pub fn next_index(&self) -> usize {
        self.log.steps.len()
    }

    /// Stamp, store and persist a step
    ///
    /// Sink failures are reported but do not stop the run; the in-memory
    /// log stays authoritative.
    pub fn record(&mut self, pending: PendingStep) -> Step {
        let step = Step::from_pending(self.next_index(), pending);
        if let Err(e) = self.sink.append(&LogRecord::from(&step)) {
            warn!(run_id = %self.log.run_id, step = step.index, error = %e, "Failed to persist step");
        }
        self.log.steps.push(step.clone());
        step
    }

    /// Allocate the screenshot location for the next observation
    pub fn next_screenshot(&mut self) -> Option<PathBuf> {
        self.observations += 1;
        self.sink.screenshot_path(self.observations)
    }

    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.log.token_usage.add(usage);
    }

    /// Write run metadata and hand back the log
    pub fn finish(mut self, status: RunStatus, summary: &str) -> (RunLog, RunMetadata) {
        let metadata = RunMetadata {
            run_id: self.log.run_id,
            task: self.log.task.clone(),
            status,
            summary: summary.to_string(),
            steps: self.log.steps.len(),
            started_at: self.log.started_at,
            finished_at: Utc::now(),
            token_usage: self.log.token_usage,
        };
        if let Err(e) = self.sink.finish(&metadata) {
            warn!(run_id = %self.log.run_id, error = %e, "Failed to write run metadata");
        }
        (self.log, metadata)
    }
}
