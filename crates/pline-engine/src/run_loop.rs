//! Event loop: merges the current trapped input source's next-record
//! future with every running task's next-event future into one dispatch
//! cycle, via `FuturesUnordered`.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use pline_core::TaskIndex;

use crate::source::Record;
use crate::system::System;
use crate::task::TaskEvent;

enum Item {
    SourceRecord(std::io::Result<Record>),
    TaskEvent(TaskIndex, std::io::Result<TaskEvent>),
}

/// Drive `system` to completion: repeatedly await whichever of {the
/// trapped source's next record, any running task's next event} resolves
/// first, dispatch it synchronously, and loop until all-done fires.
///
/// Internal I/O failures (fstat, read failures on a child pipe) are
/// fatal; this function aborts the process on them rather than returning
/// an error, matching the original's abort-on-broken-kernel-contract
/// stance.
pub async fn run(system: &mut System) {
    loop {
        if system.is_all_done() {
            return;
        }

        let (source, running) = system.split_for_poll();
        let mut pending: FuturesUnordered<
            std::pin::Pin<Box<dyn std::future::Future<Output = Item> + '_>>,
        > = FuturesUnordered::new();

        if let Some(source) = source {
            pending.push(Box::pin(async move {
                Item::SourceRecord(source.next_record().await)
            }));
        }

        for (index, task) in running {
            let Some(running) = task.running_mut() else {
                continue;
            };
            pending.push(Box::pin(async move {
                Item::TaskEvent(index, running.next_event(index).await)
            }));
        }

        if pending.is_empty() {
            drop(pending);
            if system.is_all_done() {
                return;
            }
            tracing::error!("event loop has no pending work but all-done has not fired");
            std::process::abort();
        }

        let next = pending.next().await;
        drop(pending);

        match next {
            Some(Item::SourceRecord(Ok(Record::Line(cmdline)))) => {
                system.ingest_record(cmdline);
            }
            Some(Item::SourceRecord(Ok(Record::Eof))) => {
                system.ingest_eof();
            }
            Some(Item::SourceRecord(Err(err))) => {
                tracing::error!(error = %err, "input source read failed, aborting");
                std::process::abort();
            }
            Some(Item::TaskEvent(index, Ok(event))) => {
                system.handle_task_event(index, event);
            }
            Some(Item::TaskEvent(index, Err(err))) => {
                tracing::error!(task_index = %index, error = %err, "child pipe read failed, aborting");
                std::process::abort();
            }
            None => unreachable!("pending was checked non-empty above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn e2_three_echoes_all_observed() {
        use crate::observer::Observer;
        use std::sync::{Arc, Mutex};

        #[derive(Default)]
        struct Collector {
            lines: Vec<String>,
            ended: usize,
            all_done: usize,
        }

        struct Recording(Arc<Mutex<Collector>>);
        impl Observer for Recording {
            fn line(&mut self, _index: TaskIndex, _is_stderr: bool, text: &str) {
                self.0.lock().unwrap().lines.push(text.to_string());
            }
            fn task_ended(&mut self, _index: TaskIndex, _termination: pline_core::TerminationKind) {
                self.0.lock().unwrap().ended += 1;
            }
            fn all_done(&mut self) {
                self.0.lock().unwrap().all_done += 1;
            }
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "echo a").unwrap();
        writeln!(file, "echo b").unwrap();
        writeln!(file, "echo c").unwrap();

        let collector = Arc::new(Mutex::new(Collector::default()));
        let mut system = System::new();
        system.set_max_running_tasks(2);
        system.register_observer(Box::new(Recording(collector.clone())));
        system.add_input_script(file.path()).unwrap();

        run(&mut system).await;

        let collector = collector.lock().unwrap();
        let mut lines = collector.lines.clone();
        lines.sort();
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert_eq!(collector.ended, 3);
        assert_eq!(collector.all_done, 1);
        assert_eq!(system.n_finished(), 3);
    }

    #[tokio::test]
    async fn e5_backpressure_recycles_slots() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for _ in 0..600 {
            writeln!(file, "true").unwrap();
        }

        let mut system = System::new();
        system.set_max_running_tasks(1);
        system.set_max_unstarted_tasks(500);
        system.add_input_script(file.path()).unwrap();

        run(&mut system).await;

        assert_eq!(system.n_unstarted(), 0);
        assert_eq!(system.n_running(), 0);
        assert_eq!(system.n_finished(), 600);
        assert!(system.is_all_done());
    }
}
