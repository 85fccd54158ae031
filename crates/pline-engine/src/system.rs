//! Scheduler / system: owns the task array, admission counters, input
//! source list, and observer registry.

use pline_core::TaskIndex;

use crate::observer::{Observer, ObserverRegistry};
use crate::source::DescriptorSource;
use crate::task::{Task, TaskEvent};

/// Default bound on queued-but-not-yet-dispatched tasks.
pub const DEFAULT_MAX_UNSTARTED_TASKS: usize = 500;
/// Default bound on concurrently running tasks.
pub const DEFAULT_MAX_RUNNING_TASKS: usize = 32;

pub struct System {
    tasks: Vec<Task>,
    n_unstarted: usize,
    n_running: usize,
    n_finished: usize,
    input_sources: Vec<DescriptorSource>,
    cur_input_source: usize,
    is_input_source_trapped: bool,
    max_unstarted_tasks: usize,
    max_running_tasks: usize,
    observers: ObserverRegistry,
    all_done_fired: bool,
}

impl System {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            n_unstarted: 0,
            n_running: 0,
            n_finished: 0,
            input_sources: Vec::new(),
            cur_input_source: 0,
            is_input_source_trapped: false,
            max_unstarted_tasks: DEFAULT_MAX_UNSTARTED_TASKS,
            max_running_tasks: DEFAULT_MAX_RUNNING_TASKS,
            observers: ObserverRegistry::new(),
            all_done_fired: false,
        }
    }

    pub fn n_unstarted(&self) -> usize {
        self.n_unstarted
    }

    pub fn n_running(&self) -> usize {
        self.n_running
    }

    pub fn n_finished(&self) -> usize {
        self.n_finished
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn max_unstarted_tasks(&self) -> usize {
        self.max_unstarted_tasks
    }

    pub fn max_running_tasks(&self) -> usize {
        self.max_running_tasks
    }

    pub fn is_input_source_trapped(&self) -> bool {
        self.is_input_source_trapped
    }

    pub fn cur_input_source(&self) -> usize {
        self.cur_input_source
    }

    pub fn task(&self, index: TaskIndex) -> &Task {
        &self.tasks[index.get()]
    }

    pub fn task_mut(&mut self, index: TaskIndex) -> &mut Task {
        &mut self.tasks[index.get()]
    }

    /// The current input source, if one exists and is trapped; the event
    /// loop should only poll a source while this returns `Some`.
    pub fn trapped_source_mut(&mut self) -> Option<&mut DescriptorSource> {
        if !self.is_input_source_trapped {
            return None;
        }
        self.input_sources.get_mut(self.cur_input_source)
    }

    /// Split disjoint borrows for the event loop: the trapped source (if
    /// any) and every RUNNING task, so both can be polled in the same
    /// `FuturesUnordered` without the scheduler's other state blocking
    /// concurrent access to it.
    pub fn split_for_poll(
        &mut self,
    ) -> (Option<&mut DescriptorSource>, Vec<(TaskIndex, &mut Task)>) {
        let source = if self.is_input_source_trapped {
            self.input_sources.get_mut(self.cur_input_source)
        } else {
            None
        };
        let tasks = self
            .tasks
            .iter_mut()
            .filter(|t| t.is_running())
            .map(|t| (t.index, t))
            .collect();
        (source, tasks)
    }

    pub fn register_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.register(observer);
    }

    /// Admission-gated trap: only arms a source if doing so would not
    /// violate the trapped-only-while-under-threshold invariant.
    fn admission_allows_trap(&self) -> bool {
        self.n_unstarted < self.max_unstarted_tasks && self.cur_input_source < self.input_sources.len()
    }

    fn trap_current(&mut self) {
        if let Some(source) = self.input_sources.get_mut(self.cur_input_source) {
            source.trap();
            self.is_input_source_trapped = true;
        }
    }

    fn untrap_current(&mut self) {
        if self.is_input_source_trapped {
            if let Some(source) = self.input_sources.get_mut(self.cur_input_source) {
                source.untrap();
            }
            self.is_input_source_trapped = false;
        }
    }

    pub fn add_input_source(&mut self, source: DescriptorSource) {
        let becomes_current = self.cur_input_source == self.input_sources.len();
        self.input_sources.push(source);
        if becomes_current && self.admission_allows_trap() {
            self.trap_current();
        }
    }

    pub fn add_input_script(
        &mut self,
        path: &std::path::Path,
    ) -> Result<(), pline_core::EngineError> {
        let source = DescriptorSource::from_path(path)?;
        self.add_input_source(source);
        Ok(())
    }

    pub fn add_input_stdin(&mut self) {
        self.add_input_source(DescriptorSource::from_stdin());
    }

    /// # Safety
    /// See [`DescriptorSource::from_raw_fd`].
    pub unsafe fn add_input_fd(
        &mut self,
        fd: std::os::fd::RawFd,
        should_close: bool,
    ) -> std::io::Result<()> {
        let source = unsafe { DescriptorSource::from_raw_fd(fd, should_close)? };
        self.add_input_source(source);
        Ok(())
    }

    pub fn set_max_unstarted_tasks(&mut self, n: usize) {
        self.max_unstarted_tasks = n;
        let should_be_trapped = self.n_unstarted < n && self.cur_input_source < self.input_sources.len();
        if self.is_input_source_trapped && !should_be_trapped {
            self.untrap_current();
        } else if !self.is_input_source_trapped && should_be_trapped {
            self.trap_current();
        }
    }

    pub fn set_max_running_tasks(&mut self, n: usize) {
        self.max_running_tasks = n;
        while self.n_running < self.max_running_tasks && self.n_unstarted > 0 {
            self.dispatch_next_waiting();
        }
    }

    /// Dispatch the task at index `n_finished + n_running`, which is
    /// guaranteed by insertion order to be the oldest WAITING task.
    fn dispatch_next_waiting(&mut self) {
        let idx = TaskIndex(self.n_finished + self.n_running);
        let task = &mut self.tasks[idx.get()];
        let cmdline = task.cmdline.clone();
        match task.dispatch() {
            Ok(pid) => {
                self.n_unstarted -= 1;
                self.n_running += 1;
                self.observers.task_started(idx, pid, &cmdline);
            }
            Err(err) => {
                // Pipe/fork failure is an internal-fatal condition.
                tracing::error!(task_index = %idx, error = %err, "failed to dispatch task, aborting");
                std::process::abort();
            }
        }
    }

    /// Admission control for a freshly-arrived command-line record.
    pub fn ingest_record(&mut self, cmdline: String) {
        let index = TaskIndex(self.tasks.len());
        self.tasks.push(Task::new_waiting(index, cmdline));
        self.n_unstarted += 1;

        if self.n_running < self.max_running_tasks {
            self.dispatch_next_waiting();
        }
        if self.n_unstarted >= self.max_unstarted_tasks {
            self.untrap_current();
        }
    }

    /// End-of-source sentinel from the current trapped source.
    pub fn ingest_eof(&mut self) {
        self.untrap_current();
        self.cur_input_source += 1;
        if self.cur_input_source < self.input_sources.len() {
            if self.admission_allows_trap() {
                self.trap_current();
            }
        } else {
            self.maybe_fire_all_done();
        }
    }

    fn recycle_slots(&mut self) {
        if self.cur_input_source < self.input_sources.len()
            && !self.is_input_source_trapped
            && self.n_unstarted < self.max_unstarted_tasks
        {
            self.trap_current();
        }
        while self.n_running < self.max_running_tasks && self.n_unstarted > 0 {
            self.dispatch_next_waiting();
        }
    }

    fn maybe_fire_all_done(&mut self) {
        if self.all_done_fired {
            return;
        }
        if self.n_running == 0 && self.n_unstarted == 0 && self.cur_input_source >= self.input_sources.len() {
            self.all_done_fired = true;
            self.observers.all_done();
        }
    }

    pub fn is_all_done(&self) -> bool {
        self.all_done_fired
    }

    /// Forward a running task's event to observers, performing the
    /// RUNNING -> DONE transition and downstream bookkeeping when the task
    /// has fully finished.
    pub fn handle_task_event(&mut self, index: TaskIndex, event: TaskEvent) {
        match event {
            TaskEvent::RawData { is_stderr, bytes } => {
                self.observers.raw_data(index, is_stderr, &bytes);
            }
            TaskEvent::Line { is_stderr, text } => {
                self.observers.line(index, is_stderr, &text);
            }
            TaskEvent::Reaped(_) => {}
        }

        let finished = self
            .tasks
            .get(index.get())
            .and_then(|t| match &t.state {
                crate::task::TaskState::Running(r) => Some(r.is_finished()),
                _ => None,
            })
            .unwrap_or(false);

        if finished {
            let task = &mut self.tasks[index.get()];
            task.finish();
            let termination = match &task.state {
                crate::task::TaskState::Done(d) => d.termination,
                _ => unreachable!("finish() just set Done"),
            };
            self.n_running -= 1;
            self.n_finished += 1;
            self.observers.task_ended(index, termination);
            self.recycle_slots();
            self.maybe_fire_all_done();
        }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn counts(sys: &System) -> (usize, usize, usize) {
        (sys.n_unstarted(), sys.n_running(), sys.n_finished())
    }

    #[test]
    fn thresholds_default_per_spec() {
        let sys = System::new();
        assert_eq!(sys.max_unstarted_tasks(), 500);
        assert_eq!(sys.max_running_tasks(), 32);
    }

    #[tokio::test]
    async fn set_max_running_tasks_dispatches_backlog() {
        let mut sys = System::new();
        sys.set_max_running_tasks(0);
        sys.add_input_stdin();
        sys.ingest_record("true".into());
        sys.ingest_record("true".into());
        assert_eq!(counts(&sys), (2, 0, 0));
        sys.set_max_running_tasks(10);
        assert_eq!(counts(&sys), (0, 2, 0));
    }

    #[test]
    fn set_max_unstarted_tasks_traps_and_untraps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for _ in 0..5 {
            writeln!(file, "true").unwrap();
        }
        let mut sys = System::new();
        sys.set_max_running_tasks(0);
        sys.add_input_script(file.path()).unwrap();
        assert!(sys.is_input_source_trapped());

        sys.set_max_unstarted_tasks(0);
        assert!(!sys.is_input_source_trapped());

        sys.set_max_unstarted_tasks(500);
        assert!(sys.is_input_source_trapped());
    }

    #[tokio::test]
    async fn e1_single_echo_task_reaches_all_done() {
        let mut sys = System::new();
        sys.set_max_running_tasks(1);
        sys.set_max_unstarted_tasks(1);
        sys.ingest_record("echo hi".into());
        sys.ingest_eof();
        assert_eq!(counts(&sys), (0, 1, 0));

        let index = TaskIndex(0);
        loop {
            let event = {
                let running = sys.task_mut(index).running_mut().unwrap();
                running.next_event(index).await.unwrap()
            };
            sys.handle_task_event(index, event);
            if sys.task(index).is_done() {
                break;
            }
        }
        assert_eq!(counts(&sys), (0, 0, 1));
        assert!(sys.is_all_done());
    }
}
