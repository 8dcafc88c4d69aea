//! LLM module - the reasoning service
//!
//! Provides the backend-neutral trait, the Ollama implementation and reply
//! validation.

pub mod intent;
pub mod ollama;
pub mod traits;

pub use intent::parse_intent;
pub use ollama::OllamaClient;
pub use traits::{ReasoningReply, ReasoningRequest, ReasoningService};
