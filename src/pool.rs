//! Adaptive worker pool: the concurrency core of the engine.
//!
//! Descriptors are pulled from the scanner in bounded batches and fed to a
//! fixed set of worker threads through a capacity-limited queue. The
//! admission loop doubles as the control loop: it streams terminal outcomes
//! to the caller as they complete and, at adjustment-interval boundaries,
//! moves the active-worker target one step at a time in response to the
//! memory-pressure signal. Workers above the target idle rather than exit,
//! so shrinking never interrupts in-flight work.

mod queue;
pub mod state;
pub mod task;

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::hashing::{self, HashAlgorithm, HashErrorKind};
use crate::progress::ProgressTracker;
use crate::resource_monitor::MemoryPressure;
use crate::scanner::{FileDescriptor, ScanError};

use queue::TaskQueue;
use state::PoolState;
use task::{AttemptOutcome, settle_attempt};
pub use task::{HashFailure, HashResult, HashTask, TaskOutcome};

/// Pause between condition re-checks in the admission loop; workers park for
/// twice this between claims.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Errors that prevent the pool from running at all.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to spawn worker thread: {source}")]
    Spawn { source: std::io::Error },
}

/// Totals for one completed (or canceled) run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Descriptors handed to the worker queue.
    pub admitted: usize,
    pub processed: usize,
    pub failed: usize,
    /// Tasks admitted but never started because the run was canceled.
    pub canceled: usize,
    pub scan_errors: usize,
    pub bytes_hashed: u64,
    pub elapsed: Duration,
    /// Capped list of the first error details; never an unbounded dump.
    pub first_errors: Vec<String>,
}

/// Resource-aware scheduler for hashing work.
pub struct HashPool {
    algorithm: HashAlgorithm,
    chunk_size: usize,
    mmap_threshold: u64,
    min_workers: usize,
    max_workers: usize,
    adjust_interval: Duration,
    memory_threshold: f64,
    batch_size: usize,
    max_retries: u32,
    retry_delay: Duration,
    max_errors_shown: usize,
    pressure: MemoryPressure,
    cancel: Arc<AtomicBool>,
    progress: Arc<ProgressTracker>,
}

/// State shared between the admission loop and the workers for one run.
struct PoolShared {
    queue: TaskQueue,
    /// Published snapshot of the control loop's worker target; workers read
    /// it at dispatch time and never touch the sizing state itself.
    target: AtomicUsize,
    /// Set once no further tasks will be admitted.
    draining: AtomicBool,
    cancel: Arc<AtomicBool>,
}

impl HashPool {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        let algorithm = config.parsed_algorithm()?;
        let max_workers = config.effective_max_workers();
        Ok(Self {
            algorithm,
            chunk_size: config.chunk_size,
            mmap_threshold: config.mmap_threshold,
            min_workers: config.min_workers.min(max_workers),
            max_workers,
            adjust_interval: config.worker_adjust_interval(),
            memory_threshold: config.memory_threshold,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            max_errors_shown: config.max_errors_shown,
            pressure: MemoryPressure::neutral(),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(ProgressTracker::new()),
        })
    }

    /// Attach a live memory-pressure signal. Without one the pool behaves as
    /// if memory were never constrained.
    pub fn with_pressure(mut self, pressure: MemoryPressure) -> Self {
        self.pressure = pressure;
        self
    }

    /// Cancellation flag observed by workers and the admission loop. Setting
    /// it stops new dispatch immediately; in-flight tasks still finish. The
    /// flag is sticky across runs.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Shared counters, updated fire-and-forget on every terminal result.
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Drain `files`, hashing every admitted descriptor and streaming each
    /// terminal outcome into `on_result` as it completes.
    ///
    /// Every descriptor admitted to the queue yields exactly one
    /// [`TaskOutcome`] unless the run is canceled, in which case unstarted
    /// tasks are counted in [`RunSummary::canceled`] instead.
    pub fn run<I, F>(&self, files: I, mut on_result: F) -> Result<RunSummary, PoolError>
    where
        I: Iterator<Item = Result<FileDescriptor, ScanError>>,
        F: FnMut(&TaskOutcome),
    {
        let shared = PoolShared {
            queue: TaskQueue::new(self.batch_size * 2),
            target: AtomicUsize::new(self.max_workers),
            draining: AtomicBool::new(false),
            cancel: Arc::clone(&self.cancel),
        };
        let (tx, rx) = mpsc::channel();

        std::thread::scope(|scope| {
            for index in 0..self.max_workers {
                let worker_tx = tx.clone();
                let shared_ref = &shared;
                let spawned = std::thread::Builder::new()
                    .name(format!("hashscan-worker-{index}"))
                    .spawn_scoped(scope, move || self.worker_loop(shared_ref, index, worker_tx));
                if let Err(source) = spawned {
                    // Wake and release any workers that did start.
                    shared.draining.store(true, Ordering::Relaxed);
                    shared.queue.notify_all();
                    return Err(PoolError::Spawn { source });
                }
            }
            drop(tx);
            Ok(self.admission_loop(&shared, files, rx, &mut on_result))
        })
    }

    fn admission_loop<I, F>(
        &self,
        shared: &PoolShared,
        mut files: I,
        rx: Receiver<TaskOutcome>,
        on_result: &mut F,
    ) -> RunSummary
    where
        I: Iterator<Item = Result<FileDescriptor, ScanError>>,
        F: FnMut(&TaskOutcome),
    {
        let started = Instant::now();
        let mut state = PoolState::new(self.min_workers, self.max_workers);
        let mut carry: VecDeque<HashTask> = VecDeque::new();
        let mut scanner_done = false;
        let mut cancel_handled = false;
        let mut summary = RunSummary::default();

        loop {
            let canceling = shared.cancel.load(Ordering::Relaxed);
            if canceling && !cancel_handled {
                let dropped = shared.queue.drain();
                summary.canceled += dropped.len();
                carry.clear();
                scanner_done = true;
                shared.draining.store(true, Ordering::Relaxed);
                shared.queue.notify_all();
                cancel_handled = true;
                debug!(
                    canceled = summary.canceled,
                    "Cancellation requested; new dispatch stopped"
                );
            }

            if !canceling {
                if carry.is_empty() && !scanner_done {
                    self.pull_batch(&mut files, &mut carry, &mut scanner_done, &mut summary);
                }
                summary.admitted += shared.queue.push_available(&mut carry);
                if scanner_done && carry.is_empty() && !shared.draining.load(Ordering::Relaxed) {
                    shared.draining.store(true, Ordering::Relaxed);
                    shared.queue.notify_all();
                }
            }

            let outstanding =
                summary.admitted - summary.processed - summary.failed - summary.canceled;
            if outstanding == 0 && scanner_done && carry.is_empty() {
                break;
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(outcome) => {
                    self.settle_outcome(outcome, &mut summary, on_result);
                    while let Ok(extra) = rx.try_recv() {
                        self.settle_outcome(extra, &mut summary, on_result);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(step) = state.adjust(
                self.pressure.fraction(),
                self.memory_threshold,
                shared.queue.len(),
                Instant::now(),
                self.adjust_interval,
            ) {
                shared.target.store(state.current(), Ordering::Relaxed);
                shared.queue.notify_all();
                debug!(
                    step = ?step,
                    workers = state.current(),
                    pending = state.pending(),
                    "Adjusted worker target"
                );
            }
        }

        summary.elapsed = started.elapsed();
        summary
    }

    fn pull_batch<I>(
        &self,
        files: &mut I,
        carry: &mut VecDeque<HashTask>,
        scanner_done: &mut bool,
        summary: &mut RunSummary,
    ) where
        I: Iterator<Item = Result<FileDescriptor, ScanError>>,
    {
        while carry.len() < self.batch_size {
            match files.next() {
                Some(Ok(descriptor)) => {
                    carry.push_back(HashTask::new(descriptor, self.algorithm));
                }
                Some(Err(error)) => {
                    warn!(error = %error, "Scan error; continuing");
                    summary.scan_errors += 1;
                    if summary.first_errors.len() < self.max_errors_shown {
                        summary.first_errors.push(error.to_string());
                    }
                }
                None => {
                    *scanner_done = true;
                    break;
                }
            }
        }
    }

    fn settle_outcome<F>(&self, outcome: TaskOutcome, summary: &mut RunSummary, on_result: &mut F)
    where
        F: FnMut(&TaskOutcome),
    {
        match &outcome {
            TaskOutcome::Success(result) => {
                summary.processed += 1;
                summary.bytes_hashed += result.size;
                self.progress.record_success(result.size);
            }
            TaskOutcome::Failure(failure) => {
                summary.failed += 1;
                self.progress.record_failure();
                if summary.first_errors.len() < self.max_errors_shown {
                    summary.first_errors.push(format!(
                        "{}: {}",
                        failure.path.display(),
                        failure.message
                    ));
                }
            }
        }
        on_result(&outcome);
    }

    fn worker_loop(&self, shared: &PoolShared, index: usize, tx: Sender<TaskOutcome>) {
        loop {
            if shared.cancel.load(Ordering::Relaxed) {
                return;
            }
            if index < shared.target.load(Ordering::Relaxed)
                && let Some(task) = shared.queue.try_claim()
            {
                let outcome = self.execute_task(shared, task);
                if tx.send(outcome).is_err() {
                    return;
                }
                continue;
            }
            if shared.draining.load(Ordering::Relaxed) && shared.queue.len() == 0 {
                return;
            }
            shared.queue.wait_for_work(POLL_INTERVAL * 2);
        }
    }

    /// Execute one task to a terminal outcome, blocking only on file I/O and
    /// the retry delay.
    fn execute_task(&self, shared: &PoolShared, mut task: HashTask) -> TaskOutcome {
        loop {
            let started = Instant::now();
            let attempt = catch_unwind(AssertUnwindSafe(|| {
                hashing::hash_file(
                    &task.descriptor.path,
                    task.algorithm,
                    self.chunk_size,
                    self.mmap_threshold,
                )
            }));
            let result = match attempt {
                Ok(result) => result,
                Err(payload) => {
                    task.attempts += 1;
                    let failure = HashFailure {
                        path: task.descriptor.path.clone(),
                        kind: HashErrorKind::Io,
                        message: format!("worker panicked: {}", panic_message(payload)),
                        attempts: task.attempts,
                    };
                    warn!(path = %failure.path.display(), "Hashing worker panicked");
                    return TaskOutcome::Failure(failure);
                }
            };
            match settle_attempt(task, result, started.elapsed(), self.max_retries) {
                AttemptOutcome::Done(outcome) => return outcome,
                AttemptOutcome::Retry { task: next, error } => {
                    debug!(
                        path = %next.descriptor.path.display(),
                        attempt = next.attempts,
                        error = %error.message,
                        "Retrying after transient failure"
                    );
                    task = next;
                    sleep_unless_canceled(&shared.cancel, self.retry_delay);
                    if shared.cancel.load(Ordering::Relaxed) {
                        return TaskOutcome::Failure(HashFailure {
                            path: task.descriptor.path.clone(),
                            kind: error.kind,
                            message: format!(
                                "canceled while waiting to retry: {}",
                                error.message
                            ),
                            attempts: task.attempts,
                        });
                    }
                }
            }
        }
    }
}

fn sleep_unless_canceled(cancel: &AtomicBool, delay: Duration) {
    let deadline = Instant::now() + delay;
    while Instant::now() < deadline {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(remaining.min(Duration::from_millis(50)));
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
