//! The two built-in observer modes, matching the original's `modes[]`
//! table (default mode must stay first so `--list-modes` prints it
//! first and an unqualified `-m` choice is never required).

mod chunked;
mod default;

use std::cell::RefCell;
use std::rc::Rc;

use pline_core::{TaskIndex, TerminationKind};
use pline_engine::Observer;

pub struct ModeInfo {
    pub name: &'static str,
    pub description: &'static str,
}

pub const MODES: &[ModeInfo] = &[
    ModeInfo {
        name: "default",
        description: "display line-by-line stdout and stderr with timestamps and other info",
    },
    ModeInfo {
        name: "chunked",
        description: "group each task's output together",
    },
];

/// A mode observer additionally knows the process exit code it wants once
/// the run completes.
pub trait ModeObserver: Observer {
    fn exit_code(&self) -> i32 {
        0
    }
}

pub fn build(name: &str) -> Result<Rc<RefCell<dyn ModeObserver>>, pline_core::EngineError> {
    match name {
        "default" => Ok(Rc::new(RefCell::new(default::DefaultObserver::new()))),
        "chunked" => Ok(Rc::new(RefCell::new(chunked::ChunkedObserver::new()))),
        other => Err(pline_core::EngineError::Cmdline(format!(
            "bad mode {other}: try --list-modes"
        ))),
    }
}

/// Bridges a shared, `Rc<RefCell<...>>`-held mode observer into the
/// engine's `Box<dyn Observer>` registry, so `pline-cli` can keep a handle
/// to query `exit_code()` after the run loop finishes. `Rc`/`RefCell`
/// rather than `Arc`/`Mutex`: the engine runs on a single `current_thread`
/// runtime, so there is never a second thread to synchronize against.
pub struct Shared(pub Rc<RefCell<dyn ModeObserver>>);

impl Observer for Shared {
    fn task_started(&mut self, index: TaskIndex, pid: u32, cmdline: &str) {
        self.0.borrow_mut().task_started(index, pid, cmdline);
    }

    fn raw_data(&mut self, index: TaskIndex, is_stderr: bool, bytes: &[u8]) {
        self.0.borrow_mut().raw_data(index, is_stderr, bytes);
    }

    fn line(&mut self, index: TaskIndex, is_stderr: bool, text: &str) {
        self.0.borrow_mut().line(index, is_stderr, text);
    }

    fn task_ended(&mut self, index: TaskIndex, termination: TerminationKind) {
        self.0.borrow_mut().task_ended(index, termination);
    }

    fn all_done(&mut self) {
        self.0.borrow_mut().all_done();
    }
}
