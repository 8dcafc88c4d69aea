//! Core module - shared infrastructure for webpilot
//!
//! This module contains the run data model, configuration, and error
//! handling used throughout the crate.

pub mod config;
pub mod error;
pub mod text;
pub mod types;

pub use config::Config;
pub use error::{FailureKind, PilotError, Result};
pub use types::*;
