//! Worker-count bookkeeping for the adaptive pool.

use std::time::{Duration, Instant};

/// Extra clearance below the memory threshold required before growing, so a
/// pressure reading hovering at the threshold cannot make the pool oscillate.
const GROWTH_HEADROOM: f64 = 0.05;

/// Sizing state owned by the pool's control loop.
///
/// Only the control loop mutates this; workers read a published snapshot of
/// the current target. The current count stays within `[min, max]` for any
/// sequence of pressure samples, and moves at most one step per adjustment
/// interval.
#[derive(Debug)]
pub struct PoolState {
    current: usize,
    min: usize,
    max: usize,
    last_adjustment: Instant,
    pending: usize,
}

/// Direction of a single adjustment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustStep {
    Shrink,
    Grow,
}

impl PoolState {
    /// Start at the upper bound; memory pressure shrinks the pool from there.
    pub fn new(min: usize, max: usize) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        Self {
            current: max,
            min,
            max,
            last_adjustment: Instant::now(),
            pending: 0,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Apply at most one sizing step if the adjustment interval has elapsed.
    ///
    /// Pressure above the threshold shrinks toward `min`; pressure comfortably
    /// below it grows toward `max` while work is pending. Returns the step
    /// taken, if any.
    pub fn adjust(
        &mut self,
        pressure: f64,
        threshold: f64,
        pending: usize,
        now: Instant,
        interval: Duration,
    ) -> Option<AdjustStep> {
        self.pending = pending;
        if now.duration_since(self.last_adjustment) < interval {
            return None;
        }
        self.last_adjustment = now;
        if pressure > threshold {
            if self.current > self.min {
                self.current -= 1;
                return Some(AdjustStep::Shrink);
            }
            return None;
        }
        if pressure < threshold - GROWTH_HEADROOM && pending > 0 && self.current < self.max {
            self.current += 1;
            return Some(AdjustStep::Grow);
        }
        None
    }
}
