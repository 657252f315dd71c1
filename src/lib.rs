//! Library exports for the hashscan engine, reused by the CLI and tests.
/// Resolved configuration bundle and validation.
pub mod config;
mod config_defaults;
/// Per-file digest computation strategies.
pub mod hashing;
/// Tracing setup.
pub mod logging;
/// Adaptive worker pool scheduling hashing work.
pub mod pool;
/// Concurrency-safe progress accumulation.
pub mod progress;
/// Report sinks, readers, and snapshot comparison.
pub mod report;
/// Memory-pressure sampling.
pub mod resource_monitor;
/// Directory traversal and path filtering.
pub mod scanner;
