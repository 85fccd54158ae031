use pline_core::{TaskIndex, TerminationKind};
use pline_engine::Observer;

use super::ModeObserver;

const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Prints every line as it arrives, unordered across tasks, with a
/// timestamp and task index. Always exits 0 — a nonzero or signaled
/// child is reported but not treated as a program-level failure.
pub struct DefaultObserver;

impl DefaultObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for DefaultObserver {
    fn task_started(&mut self, index: TaskIndex, pid: u32, cmdline: &str) {
        let now = pline_core::now();
        eprintln!(
            "{} [{:>6}] started (pid {pid}): {cmdline}",
            now.format(TIMESTAMP_FMT),
            index.get()
        );
    }

    fn line(&mut self, index: TaskIndex, is_stderr: bool, text: &str) {
        let now = pline_core::now();
        let marker = if is_stderr { '!' } else { ':' };
        let line = format!(
            "{} [{:>6}]{marker} {text}",
            now.format(TIMESTAMP_FMT),
            index.get()
        );
        if is_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }

    fn task_ended(&mut self, index: TaskIndex, termination: TerminationKind) {
        let now = pline_core::now();
        match termination {
            TerminationKind::Exit { code: 0 } => {
                eprintln!(
                    "{}: Task {} exited with status 0: success.",
                    now.format(TIMESTAMP_FMT),
                    index.get()
                );
            }
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
    }
}

impl ModeObserver for DefaultObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_exit_code_is_always_zero() {
        let observer = DefaultObserver::new();
        assert_eq!(observer.exit_code(), 0);
    }
}
