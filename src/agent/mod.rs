//! Agent module - the browsing loop and its collaborators
//!
//! The orchestrator drives the observe/plan/act cycle. Memory compresses
//! history, policy gates risky actions, recovery walks the retry ladder and
//! the run log keeps the step record.

pub mod confirm;
pub mod loop_state;
pub mod memory;
pub mod orchestrator;
pub mod policy;
pub mod prompts;
pub mod recovery;
pub mod run_log;

pub use confirm::{ConfirmationGate, ConfirmationRequest, TerminalGate};
pub use loop_state::{AgentLoopState, LoopState};
pub use memory::{Memory, MemoryContext, MemoryEntry};
pub use orchestrator::{Orchestrator, RunReport};
pub use policy::{PolicyClassifier, PolicyRule};
pub use recovery::{RecoveryController, Rung};
pub use run_log::{JsonlRunLog, LogRecord, LogSink, MemoryRunLog, RunLog, RunMetadata, RunStatus};
