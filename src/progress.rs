//! Concurrency-safe accumulation of run progress.
//!
//! Workers record terminal results with single atomic increments and never
//! block; throughput and ETA are derived lazily in [`ProgressTracker::snapshot`],
//! on whatever refresh cadence the presentation layer chooses, so bursty
//! completions cannot make the derived numbers jitter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared accumulator updated on every terminal result.
pub struct ProgressTracker {
    processed: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
    started: Instant,
}

/// Point-in-time view with derived rates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub bytes: u64,
    pub elapsed: Duration,
    pub files_per_sec: f64,
    pub bytes_per_sec: f64,
    /// Estimated time remaining, when an expected total is known and at
    /// least one file has completed.
    pub eta: Option<Duration>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record a successful hash. Fire-and-forget.
    pub fn record_success(&self, bytes: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a terminal failure. Fire-and-forget.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Derive rates and (given an expected total) an ETA.
    pub fn snapshot(&self, expected_total: Option<u64>) -> ProgressSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let bytes = self.bytes.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed();
        let seconds = elapsed.as_secs_f64();
        let completed = processed + failed;
        let files_per_sec = if seconds > 0.0 {
            completed as f64 / seconds
        } else {
            0.0
        };
        let bytes_per_sec = if seconds > 0.0 {
            bytes as f64 / seconds
        } else {
            0.0
        };
        let eta = expected_total.and_then(|total| {
            if files_per_sec <= 0.0 {
                return None;
            }
            let remaining = total.saturating_sub(completed);
            Some(Duration::from_secs_f64(remaining as f64 / files_per_sec))
        });
        ProgressSnapshot {
            processed,
            failed,
            bytes,
            elapsed,
            files_per_sec,
            bytes_per_sec,
            eta,
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
