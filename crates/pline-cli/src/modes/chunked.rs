use std::io::Write;

use pline_core::{TaskIndex, TerminationKind};
use pline_engine::Observer;

use super::ModeObserver;

const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Groups each task's stdout together by buffering it until all
/// lower-indexed tasks have flushed, giving deterministic per-task output
/// despite unordered completion. Stderr is still interleaved live,
/// timestamped, as it arrives. Exits 1 if any task ended non-zero or
/// signaled.
pub struct ChunkedObserver {
    buffers: Vec<Vec<u8>>,
    ended: Vec<Option<TerminationKind>>,
    next_to_end: usize,
    failed: bool,
}

impl ChunkedObserver {
    pub fn new() -> Self {
        Self {
            buffers: Vec::new(),
            ended: Vec::new(),
            next_to_end: 0,
            failed: false,
        }
    }

    /// Flush the current front task's buffered stdout (whatever has
    /// accumulated so far, even if it hasn't ended yet), then keep
    /// advancing past already-ended tasks.
    fn flush_ready(&mut self) {
        loop {
            let Some(buf) = self.buffers.get_mut(self.next_to_end) else {
                break;
            };
            if !buf.is_empty() {
                let data = std::mem::take(buf);
                let _ = std::io::stdout().write_all(&data);
            }
            match self.ended[self.next_to_end] {
                Some(_) => self.next_to_end += 1,
                None => break,
            }
        }
    }
}

impl Observer for ChunkedObserver {
    fn task_started(&mut self, index: TaskIndex, _pid: u32, _cmdline: &str) {
        debug_assert_eq!(index.get(), self.buffers.len());
        self.buffers.push(Vec::new());
        self.ended.push(None);
    }

    fn raw_data(&mut self, index: TaskIndex, is_stderr: bool, bytes: &[u8]) {
        if is_stderr {
            return;
        }
        if index.get() == self.next_to_end {
            let _ = std::io::stdout().write_all(bytes);
        } else {
            self.buffers[index.get()].extend_from_slice(bytes);
        }
    }

    fn line(&mut self, index: TaskIndex, is_stderr: bool, text: &str) {
        if !is_stderr {
            return;
        }
        let now = pline_core::now();
        eprintln!("{} [{:>6}]! {text}", now.format(TIMESTAMP_FMT), index.get());
    }

    fn task_ended(&mut self, index: TaskIndex, termination: TerminationKind) {
        if !termination.is_success() {
            self.failed = true;
        }
        let now = pline_core::now();
        match termination {
            TerminationKind::Exit { code: 0 } => {}
            TerminationKind::Exit { code } => {
                eprintln!(
                    "{}! Task {} exited with status {code}!",
                    now.format(TIMESTAMP_FMT),
                    index.get()
                );
            }
            TerminationKind::Signal { signal, core_dumped } => {
                let suffix = if core_dumped { " (core dumped)" } else { "" };
                eprintln!(
                    "{}! Task {} killed by signal {signal}{suffix}!",
                    now.format(TIMESTAMP_FMT),
                    index.get()
                );
            }
        }
        self.ended[index.get()] = Some(termination);
        self.flush_ready();
    }
}

impl ModeObserver for ChunkedObserver {
    fn exit_code(&self) -> i32 {
        if self.failed { 1 } else { 0 }
    }
}
