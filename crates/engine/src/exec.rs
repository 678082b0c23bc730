//! The mutation-thread executor.
//!
//! One single-threaded cooperative simulation thread owns all world-state
//! mutation, mirroring a game-server tick loop. The executor is constructed
//! *on* that thread and drained by it once per tick; every other thread
//! interacts through a cloned [`ExecHandle`], either to test thread
//! affinity or to repost work fire-and-forget.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, ThreadId};
use tracing::warn;

/// A unit of deferred work for the mutation thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Receiving side, owned by the mutation thread.
pub struct Executor {
    primary: ThreadId,
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl Executor {
    /// Create an executor bound to the calling thread. Must be called on
    /// the simulation thread before any engine work starts.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            primary: thread::current().id(),
            sender,
            receiver,
        }
    }

    /// A clonable handle for posting and affinity checks.
    pub fn handle(&self) -> ExecHandle {
        ExecHandle {
            primary: self.primary,
            sender: self.sender.clone(),
        }
    }

    /// Run every task queued so far. Returns the number of tasks executed.
    /// Tasks posted by a running task are picked up on the next call, which
    /// keeps a repost storm from starving the tick.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        let queued: Vec<Task> = self.receiver.try_iter().collect();
        for task in queued {
            task();
            ran += 1;
        }
        ran
    }

    /// Drain until no tasks remain, including tasks queued by tasks.
    pub fn drain(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending side, clonable and shareable across threads.
#[derive(Clone)]
pub struct ExecHandle {
    primary: ThreadId,
    sender: Sender<Task>,
}

impl ExecHandle {
    /// Whether the calling thread is the mutation thread.
    pub fn is_primary(&self) -> bool {
        thread::current().id() == self.primary
    }

    /// Fire-and-forget repost onto the mutation thread. No return value is
    /// threaded back; if the executor is gone the task is dropped with a
    /// warning.
    pub fn post(&self, task: Task) {
        if self.sender.send(task).is_err() {
            warn!("mutation executor is gone; dropping reposted task");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn primary_thread_is_the_constructing_thread() {
        let exec = Executor::new();
        let handle = exec.handle();
        assert!(handle.is_primary());

        let off_thread = {
            let handle = handle.clone();
            thread::spawn(move || handle.is_primary())
        };
        assert!(!off_thread.join().unwrap());
    }

    #[test]
    fn posted_tasks_run_only_on_run_pending() {
        let exec = Executor::new();
        let handle = exec.handle();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        handle.post(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(exec.run_pending(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tasks_posted_from_other_threads_are_deferred() {
        let exec = Executor::new();
        let handle = exec.handle();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        let h = handle.clone();
        thread::spawn(move || {
            h.post(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        })
        .join()
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        exec.run_pending();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drain_runs_tasks_queued_by_tasks() {
        let exec = Executor::new();
        let handle = exec.handle();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        let inner_handle = handle.clone();
        handle.post(Box::new(move || {
            let c2 = c.clone();
            c.fetch_add(1, Ordering::SeqCst);
            inner_handle.post(Box::new(move || {
                c2.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        assert_eq!(exec.drain(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
