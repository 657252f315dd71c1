//! Periodic sampling of system memory utilization.
//!
//! The monitor publishes the latest sample as a fraction of total memory in
//! use. It is advisory input to the pool's sizing decision, never a gate: if
//! sampling is unavailable the signal stays neutral and the pool keeps
//! running at full capability.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use sysinfo::System;
use tracing::warn;

/// Shared handle to the latest memory-pressure sample.
///
/// Cheap to clone; readers never block writers.
#[derive(Clone)]
pub struct MemoryPressure {
    bits: Arc<AtomicU64>,
}

impl MemoryPressure {
    /// A pressure signal permanently reading 0.0 ("no pressure").
    pub fn neutral() -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }

    /// Latest sample: used memory as a fraction of total, in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Background sampler with explicit lifecycle: started alongside the pool,
/// stopped (flag plus join) when dropped.
pub struct ResourceMonitor {
    pressure: MemoryPressure,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ResourceMonitor {
    /// Spawn the sampling thread. The first sample is taken immediately so
    /// the pool never starts against a stale zero reading.
    pub fn start(interval: Duration) -> Self {
        let pressure = MemoryPressure::neutral();
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_pressure = pressure.clone();
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("hashscan-monitor".to_string())
            .spawn(move || sample_loop(thread_pressure, thread_shutdown, interval))
            .map_err(|source| {
                warn!(error = %source, "Failed to spawn resource monitor; pressure stays neutral");
                source
            })
            .ok();
        Self {
            pressure,
            shutdown,
            handle,
        }
    }

    /// Handle for readers; stays valid (frozen at the last sample) after the
    /// monitor stops.
    pub fn pressure(&self) -> MemoryPressure {
        self.pressure.clone()
    }

    /// Signal the sampler to stop and wait for it to exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sample_loop(pressure: MemoryPressure, shutdown: Arc<AtomicBool>, interval: Duration) {
    let mut system = System::new();
    let mut warned_unavailable = false;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            if !warned_unavailable {
                warn!("Memory sampling unavailable; reporting neutral pressure");
                warned_unavailable = true;
            }
            pressure.store(0.0);
        } else {
            let fraction = system.used_memory() as f64 / total as f64;
            pressure.store(fraction.clamp(0.0, 1.0));
        }
        sleep_interruptibly(&shutdown, interval);
    }
}

/// Sleep in short steps so shutdown is honored promptly even with long
/// sampling intervals.
fn sleep_interruptibly(shutdown: &AtomicBool, interval: Duration) {
    let deadline = Instant::now() + interval;
    while Instant::now() < deadline {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(remaining.min(Duration::from_millis(50)));
    }
}
