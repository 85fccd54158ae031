//! Shared value types and error kinds for the `pline` task-scheduling engine.

pub mod error;
pub mod types;

pub use error::EngineError;
pub use types::{EventTime, TaskIndex, TerminationKind, now};
