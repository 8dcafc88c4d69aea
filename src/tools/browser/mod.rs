//! Browser automation module
//!
//! `BrowserDriver` is the seam the orchestrator talks to; `AgentBrowser`
//! implements it on top of the agent-browser CLI.

pub mod dom;
pub mod driver;
mod executor;

pub use driver::{BrowserAction, BrowserDriver};
pub use executor::{classify_stderr, AgentBrowser, MAX_WAIT_SECS};
