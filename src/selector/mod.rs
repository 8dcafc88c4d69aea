//! Selector module - turns element descriptions into page locators
//!
//! - **Ranker**: orders candidates by locator stability
//! - **Synthesizer**: builds the locator string for each ranked candidate

pub mod ranker;
pub mod synthesizer;

pub use ranker::{rank, RankedCandidate};
pub use synthesizer::{explicit_locator, resolve, Resolution};
