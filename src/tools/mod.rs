//! Tools module - what the reasoning service can ask the browser to do
//!
//! Contains the browser collaborator and the tool registry.

pub mod browser;
pub mod registry;

pub use registry::{Invocation, ToolCategory, ToolRegistry};
