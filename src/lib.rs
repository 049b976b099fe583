//! Rassemble - declarative, template-driven deployment assembly
//!
//! A project file declares projects, each an ordered list of tasks plus a
//! settings schema. Task fields are templates resolved against the `env`,
//! `config`, `project` and `task` namespaces immediately before the task
//! runs. Tasks run strictly in order, skip work that is already done, and
//! stop at the first failure. Simulate mode describes every effect without
//! performing it.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod template;
pub mod ui;

// Re-export commonly used types
pub use error::{RassembleError, Result};

/// Current version of Rassemble
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
