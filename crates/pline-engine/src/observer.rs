//! Observer registry: replaces the original doubly-linked list of
//! callback structs with an append-only `Vec` of trait objects.

use pline_core::{TaskIndex, TerminationKind};

/// Hooks fired by the scheduler as tasks progress. Every method has a
/// no-op default, so an observer only implements what it cares about.
pub trait Observer {
    fn task_started(&mut self, _index: TaskIndex, _pid: u32, _cmdline: &str) {}

    /// Fired for every chunk read from a task's stdout/stderr, before line
    /// framing — mirrors the original's raw-data callback.
    fn raw_data(&mut self, _index: TaskIndex, _is_stderr: bool, _bytes: &[u8]) {}

    fn line(&mut self, _index: TaskIndex, _is_stderr: bool, _text: &str) {}

    fn task_ended(&mut self, _index: TaskIndex, _termination: TerminationKind) {}

    /// Fired exactly once, after every task has reached DONE and every
    /// input source has reached EOF.
    fn all_done(&mut self) {}
}

/// Append-only collection of observers, iterated in reverse-registration
/// order to match the original's "insert at the head of the list"
/// dispatch order.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Box<dyn Observer>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn task_started(&mut self, index: TaskIndex, pid: u32, cmdline: &str) {
        for o in self.observers.iter_mut().rev() {
            o.task_started(index, pid, cmdline);
        }
    }

    pub fn raw_data(&mut self, index: TaskIndex, is_stderr: bool, bytes: &[u8]) {
        for o in self.observers.iter_mut().rev() {
            o.raw_data(index, is_stderr, bytes);
        }
    }

    pub fn line(&mut self, index: TaskIndex, is_stderr: bool, text: &str) {
        for o in self.observers.iter_mut().rev() {
            o.line(index, is_stderr, text);
        }
    }

    pub fn task_ended(&mut self, index: TaskIndex, termination: TerminationKind) {
        for o in self.observers.iter_mut().rev() {
            o.task_ended(index, termination);
        }
    }

    pub fn all_done(&mut self) {
        for o in self.observers.iter_mut().rev() {
            o.all_done();
        }
    }
}
