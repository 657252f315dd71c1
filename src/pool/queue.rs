//! Bounded task queue shared between the admission loop and the workers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tracing::warn;

use super::task::HashTask;

/// FIFO of pending tasks with a fixed capacity for backpressure.
pub(super) struct TaskQueue {
    queue: Mutex<VecDeque<HashTask>>,
    ready: Condvar,
    len: AtomicUsize,
    max_size: usize,
}

impl TaskQueue {
    pub(super) fn new(max_size: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            len: AtomicUsize::new(0),
            max_size: max_size.max(1),
        }
    }

    /// Move tasks from `carry` into the queue until it reaches capacity.
    /// Returns how many were admitted.
    pub(super) fn push_available(&self, carry: &mut VecDeque<HashTask>) -> usize {
        let mut guard = self.lock_queue();
        let mut moved = 0;
        while guard.len() < self.max_size {
            let Some(task) = carry.pop_front() else {
                break;
            };
            guard.push_back(task);
            moved += 1;
        }
        self.len.store(guard.len(), Ordering::Relaxed);
        if moved > 0 {
            self.ready.notify_all();
        }
        moved
    }

    /// Pop the next pending task without blocking.
    pub(super) fn try_claim(&self) -> Option<HashTask> {
        let mut guard = self.lock_queue();
        let task = guard.pop_front();
        self.len.store(guard.len(), Ordering::Relaxed);
        task
    }

    /// Remove and return everything still pending. Used on cancellation.
    pub(super) fn drain(&self) -> Vec<HashTask> {
        let mut guard = self.lock_queue();
        let drained: Vec<HashTask> = guard.drain(..).collect();
        self.len.store(0, Ordering::Relaxed);
        drained
    }

    pub(super) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Park until work may be available or the timeout elapses. Callers
    /// re-check their own exit conditions on every wakeup.
    pub(super) fn wait_for_work(&self, timeout: Duration) {
        let guard = self.lock_queue();
        if !guard.is_empty() {
            return;
        }
        let _ = self
            .ready
            .wait_timeout(guard, timeout)
            .unwrap_or_else(|poisoned| {
                warn!("Task queue condvar poisoned; recovering.");
                poisoned.into_inner()
            });
    }

    /// Wake every parked worker, e.g. after a target change or for shutdown.
    pub(super) fn notify_all(&self) {
        self.ready.notify_all();
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<HashTask>> {
        self.queue.lock().unwrap_or_else(|poisoned| {
            warn!("Task queue lock poisoned; recovering.");
            poisoned.into_inner()
        })
    }
}
