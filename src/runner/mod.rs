//! Task execution engine
//!
//! This module turns validated project definitions into runnable tasks and
//! drives them: template resolution, side effects, and sequencing.

pub mod env;
pub mod maker;
pub mod prompt;
pub mod resolver;
pub mod sequencer;
pub mod task;
pub mod tasks;

// Re-export main types
pub use env::*;
pub use maker::*;
pub use prompt::*;
pub use resolver::*;
pub use sequencer::*;
pub use task::*;
