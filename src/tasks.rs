//! Background jobs for the UI thread.
//!
//! Slow work (saving, deleting on a bound document, exports, charts) runs on a
//! short-lived thread and reports back over a channel. The UI drains finished
//! jobs once per tick, so nothing it draws ever waits on the disk.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::session::DocumentId;

/// A finished background job.
#[derive(Debug)]
pub struct Completion {
    /// Document the job acted on, if any.
    pub document: Option<DocumentId>,
    /// Short description, e.g. "Save".
    pub label: String,
    /// Message to show on success.
    pub outcome: anyhow::Result<String>,
}

#[derive(Debug)]
pub struct TaskQueue {
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    pending: usize,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            pending: 0,
        }
    }

    /// Run `job` on its own thread. A panicking job is reported as a failure.
    pub fn spawn<F>(&mut self, document: Option<DocumentId>, label: impl Into<String>, job: F)
    where
        F: FnOnce() -> anyhow::Result<String> + Send + 'static,
    {
        let label = label.into();
        let sender = self.sender.clone();
        self.pending += 1;
        tracing::debug!(task = %label, "spawning background task");

        thread::spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job))
                .unwrap_or_else(|_| Err(anyhow!("{label} task panicked")));
            // The receiver only goes away when the UI is shutting down.
            let _ = sender.send(Completion {
                document,
                label,
                outcome,
            });
        });
    }

    /// Every job that finished since the last call, without blocking.
    pub fn drain(&mut self) -> Vec<Completion> {
        let done: Vec<Completion> = self.receiver.try_iter().collect();
        self.pending = self.pending.saturating_sub(done.len());
        done
    }

    /// Block until the next job finishes or `timeout` passes.
    pub fn wait(&mut self, timeout: Duration) -> Option<Completion> {
        let done = self.receiver.recv_timeout(timeout).ok()?;
        self.pending = self.pending.saturating_sub(1);
        Some(done)
    }

    /// Jobs spawned but not yet drained.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_idle(&self) -> bool {
        self.pending == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn completions_come_back_with_their_labels() {
        let mut queue = TaskQueue::new();
        queue.spawn(None, "Save", || Ok("saved".to_string()));
        assert_eq!(queue.pending(), 1);

        let done = queue.wait(TIMEOUT).expect("task finished");
        assert_eq!(done.label, "Save");
        assert_eq!(done.outcome.unwrap(), "saved");
        assert!(queue.is_idle());
    }

    #[test]
    fn failures_and_panics_are_reported() {
        let mut queue = TaskQueue::new();
        queue.spawn(None, "Export", || Err(anyhow!("disk full")));
        queue.spawn(None, "Chart", || panic!("boom"));

        let mut errors: Vec<String> = (0..2)
            .map(|_| queue.wait(TIMEOUT).expect("task finished"))
            .map(|done| done.outcome.unwrap_err().to_string())
            .collect();
        errors.sort();
        assert_eq!(errors, vec!["Chart task panicked", "disk full"]);
        assert!(queue.drain().is_empty());
        assert!(queue.is_idle());
    }
}
