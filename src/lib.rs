//! webpilot - a browser agent driven by a local reasoning model
//!
//! Given a natural-language task, webpilot observes the current page, asks
//! the reasoning service for the next action, resolves the described element
//! to a stable locator and performs it through agent-browser.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Reasoning service abstraction with an Ollama implementation
//! - **Selector**: Candidate ranking and locator synthesis
//! - **Tools**: Tool registry and the browser driver
//! - **Agent**: Orchestration loop, memory, policy, recovery and run log
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webpilot::agent::{MemoryRunLog, Orchestrator, TerminalGate};
//! use webpilot::llm::OllamaClient;
//! use webpilot::tools::browser::AgentBrowser;
//! use webpilot::Config;
//!
//! #[tokio::main]
//! async fn main() -> webpilot::Result<()> {
//!     let config = Config::load();
//!     let reasoning = OllamaClient::from_config(&config)?;
//!     let browser = AgentBrowser::from_config(&config.browser);
//!     let orchestrator = Orchestrator::new(
//!         config,
//!         Arc::new(reasoning),
//!         Arc::new(browser),
//!         Arc::new(TerminalGate::new()),
//!     )?;
//!
//!     let report = orchestrator
//!         .run("Find the pricing page on example.com", Box::new(MemoryRunLog::new()))
//!         .await?;
//!     println!("{:?}: {}", report.status, report.summary);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod core;
pub mod llm;
pub mod selector;
pub mod tools;

// Re-export commonly used items
pub use agent::{Orchestrator, RunReport};
pub use core::{Config, PilotError, Result};
