//! Task-scheduling and I/O-multiplexing engine: runs many independent
//! shell command lines in parallel under bounded concurrency, streaming
//! their output to registered observers.

pub mod line_reader;
pub mod observer;
pub mod run_loop;
pub mod source;
pub mod system;
pub mod task;

pub use observer::{Observer, ObserverRegistry};
pub use run_loop::run;
pub use source::{DescriptorSource, Pollability, Record};
pub use system::System;
pub use task::{Task, TaskEvent, TaskState};
