use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dense, monotonically assigned position of a task within a [`System`]'s
/// task array, in insertion order.
///
/// [`System`]: pline_engine does not depend on this crate's doc links; see
/// the engine crate for the actual owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskIndex(pub usize);

impl TaskIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for TaskIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a task's child process terminated.
///
/// Decoded from a waitpid status word: if the low 8 bits are zero the
/// process called `exit()`/`_exit()` and `code` is the exit code; otherwise
/// it died from a signal, carried as the signal number plus the core-dump
/// bit separately rather than as one packed status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationKind {
    Exit { code: i32 },
    Signal { signal: i32, core_dumped: bool },
}

impl TerminationKind {
    /// Decode a Unix waitpid status word: low 8 bits zero => exit.
    pub fn from_wait_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            match status.code() {
                Some(code) => TerminationKind::Exit { code },
                None => TerminationKind::Signal {
                    signal: status.signal().unwrap_or(0),
                    core_dumped: status.core_dumped(),
                },
            }
        }
        #[cfg(not(unix))]
        {
            TerminationKind::Exit {
                code: status.code().unwrap_or(1),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TerminationKind::Exit { code: 0 })
    }
}

/// Wall-clock moment an observer event fired.
pub type EventTime = DateTime<Utc>;

pub fn now() -> EventTime {
    Utc::now()
}
