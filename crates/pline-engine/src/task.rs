//! Task record & lifecycle: dispatch, output framing, child reap, and
//! the WAITING → RUNNING → DONE state machine.

use std::process::Stdio;

use pline_core::{TaskIndex, TerminationKind};
use tokio::process::{Child, Command};

use crate::line_reader::Advance;
use crate::line_reader::FramedStream;

const SHELL: &str = "/bin/sh";

/// One event a running task can produce, consumed by the scheduler and
/// forwarded to observers.
#[derive(Debug)]
pub enum TaskEvent {
    RawData { is_stderr: bool, bytes: Vec<u8> },
    Line { is_stderr: bool, text: String },
    Reaped(TerminationKind),
}

/// A task's payload while RUNNING: its child handle, output framers, and
/// per-stream completion flags.
pub struct RunningTask {
    child: Child,
    pid: u32,
    stdout: FramedStream<tokio::process::ChildStdout>,
    stderr: FramedStream<tokio::process::ChildStderr>,
    reaped: Option<TerminationKind>,
}

impl RunningTask {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Three-way done check: reaped AND both output streams EOF.
    pub fn is_finished(&self) -> bool {
        self.reaped.is_some() && self.stdout.is_done() && self.stderr.is_done()
    }

    pub fn termination(&self) -> Option<TerminationKind> {
        self.reaped
    }

    /// Produce the next observer-visible event. Callers must stop polling
    /// once `is_finished()` is true.
    pub async fn next_event(&mut self, task_index: TaskIndex) -> std::io::Result<TaskEvent> {
        loop {
            if let Some(bytes) = self.stdout.pop_record() {
                return Ok(TaskEvent::Line {
                    is_stderr: false,
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            if let Some(bytes) = self.stderr.pop_record() {
                return Ok(TaskEvent::Line {
                    is_stderr: true,
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }

            // The reap and the final EOF on either pipe can arrive in any
            // order. If the last of the three just landed via a `continue`
            // below, every select branch would now be disabled — stop here
            // instead of entering a select with nothing left to wait on.
            if self.is_finished() {
                return Ok(TaskEvent::Reaped(
                    self.reaped.expect("is_finished implies reaped"),
                ));
            }

            let stdout_done = self.stdout.is_done();
            let stderr_done = self.stderr.is_done();
            let reaped = self.reaped.is_some();

            let stdout_label = format!("task {task_index} stdout");
            let stderr_label = format!("task {task_index} stderr");

            tokio::select! {
                res = self.stdout.advance(&stdout_label), if !stdout_done => {
                    match res? {
                        Advance::RawData(bytes) => return Ok(TaskEvent::RawData { is_stderr: false, bytes }),
                        Advance::Eof => continue,
                    }
                }
                res = self.stderr.advance(&stderr_label), if !stderr_done => {
                    match res? {
                        Advance::RawData(bytes) => return Ok(TaskEvent::RawData { is_stderr: true, bytes }),
                        Advance::Eof => continue,
                    }
                }
                status = self.child.wait(), if !reaped => {
                    let status = status?;
                    let kind = TerminationKind::from_wait_status(status);
                    self.reaped = Some(kind);
                    return Ok(TaskEvent::Reaped(kind));
                }
            }
        }
    }
}

/// Spawn the shell interpreter for a command-line, wiring up piped
/// stdout/stderr and a null stdin (no operation in this engine writes to a
/// task's stdin, so it is never populated).
pub fn spawn(cmdline: &str) -> std::io::Result<RunningTask> {
    let mut command = Command::new(SHELL);
    command
        .arg("-c")
        .arg(cmdline)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    let mut child = command.spawn()?;
    let pid = child.id().expect("just-spawned child has a pid");
    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    Ok(RunningTask {
        child,
        pid,
        stdout: FramedStream::new(stdout, b'\n'),
        stderr: FramedStream::new(stderr, b'\n'),
        reaped: None,
    })
}

/// A task's payload while DONE.
#[derive(Debug, Clone, Copy)]
pub struct DoneTask {
    pub termination: TerminationKind,
}

/// State-dependent payload of a [`Task`], replacing the union of the original
/// design note with a sum type.
pub enum TaskState {
    Waiting,
    Running(RunningTask),
    Done(DoneTask),
}

impl TaskState {
    pub fn label(&self) -> &'static str {
        match self {
            TaskState::Waiting => "WAITING",
            TaskState::Running(_) => "RUNNING",
            TaskState::Done(_) => "DONE",
        }
    }
}

/// One command-line and its execution.
pub struct Task {
    pub index: TaskIndex,
    pub cmdline: String,
    pub state: TaskState,
}

impl Task {
    pub fn new_waiting(index: TaskIndex, cmdline: String) -> Self {
        Self {
            index,
            cmdline,
            state: TaskState::Waiting,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, TaskState::Waiting)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TaskState::Running(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, TaskState::Done(_))
    }

    pub fn running_mut(&mut self) -> Option<&mut RunningTask> {
        match &mut self.state {
            TaskState::Running(r) => Some(r),
            _ => None,
        }
    }

    /// WAITING -> RUNNING. Caller (the scheduler) has already verified
    /// admission and counters; this only performs the spawn and state
    /// transition.
    pub fn dispatch(&mut self) -> std::io::Result<u32> {
        debug_assert!(self.is_waiting(), "dispatch called on a non-WAITING task");
        let running = spawn(&self.cmdline)?;
        let pid = running.pid();
        self.state = TaskState::Running(running);
        Ok(pid)
    }

    /// RUNNING -> DONE. Caller has already observed `is_finished()` on the
    /// running payload.
    pub fn finish(&mut self) {
        let termination = match &self.state {
            TaskState::Running(r) => r
                .termination()
                .expect("finish() called before child was reaped"),
            _ => panic!("finish() called on a non-RUNNING task"),
        };
        self.state = TaskState::Done(DoneTask { termination });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_task_produces_one_line_and_exits_zero() {
        let mut task = Task::new_waiting(TaskIndex(0), "echo hi".to_string());
        task.dispatch().unwrap();
        let mut saw_line = false;
        let index = task.index;
        loop {
            let running = task.running_mut().unwrap();
            if running.is_finished() {
                break;
            }
            match running.next_event(index).await.unwrap() {
                TaskEvent::Line { is_stderr, text } => {
                    assert!(!is_stderr);
                    assert_eq!(text, "hi");
                    saw_line = true;
                }
                TaskEvent::RawData { .. } => {}
                TaskEvent::Reaped(kind) => {
                    assert_eq!(kind, TerminationKind::Exit { code: 0 });
                }
            }
        }
        assert!(saw_line);
        task.finish();
        assert!(task.is_done());
    }

    #[tokio::test]
    async fn exit_code_task_reports_exit_kind() {
        let mut task = Task::new_waiting(TaskIndex(0), "exit 7".to_string());
        task.dispatch().unwrap();
        let index = task.index;
        loop {
            let running = task.running_mut().unwrap();
            if running.is_finished() {
                break;
            }
            running.next_event(index).await.unwrap();
        }
        task.finish();
        match task.state {
            TaskState::Done(DoneTask {
                termination: TerminationKind::Exit { code: 7 },
            }) => {}
            _ => panic!("expected Exit{{code: 7}}"),
        }
    }

    #[tokio::test]
    async fn signaled_task_reports_signal_kind() {
        let mut task = Task::new_waiting(TaskIndex(0), "kill -TERM $$".to_string());
        task.dispatch().unwrap();
        let index = task.index;
        loop {
            let running = task.running_mut().unwrap();
            if running.is_finished() {
                break;
            }
            running.next_event(index).await.unwrap();
        }
        task.finish();
        match task.state {
            TaskState::Done(DoneTask {
                termination: TerminationKind::Signal { signal, .. },
            }) => {
                assert_eq!(signal, libc::SIGTERM);
            }
            _ => panic!("expected Signal termination"),
        }
    }

    #[tokio::test]
    async fn no_trailing_newline_yields_raw_data_but_no_line() {
        let mut task = Task::new_waiting(TaskIndex(0), "printf 'no-newline'".to_string());
        task.dispatch().unwrap();
        let mut saw_line = false;
        let mut saw_raw = false;
        let index = task.index;
        loop {
            let running = task.running_mut().unwrap();
            if running.is_finished() {
                break;
            }
            match running.next_event(index).await.unwrap() {
                TaskEvent::Line { .. } => saw_line = true,
                TaskEvent::RawData { bytes, is_stderr: false } => {
                    if bytes == b"no-newline" {
                        saw_raw = true;
                    }
                }
                _ => {}
            }
        }
        assert!(saw_raw, "expected raw-data event with the unterminated bytes");
        assert!(!saw_line, "a terminator-less tail must not fire a line event");
    }
}
