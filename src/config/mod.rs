//! Configuration parsing and validation
//!
//! This module handles parsing of rassemble.yml project files, validation of
//! their structure, and the external settings that feed project settings.

pub mod parse;
pub mod schema;
pub mod settings;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use settings::*;
pub use types::*;
