//! Default values for the engine configuration, collected in one place so the
//! serde attributes in `config.rs` stay readable.

pub(crate) const MAX_WORKER_LIMIT: usize = 256;

pub(crate) fn default_algorithm() -> String {
    "md5".to_string()
}

pub(crate) fn default_chunk_size() -> usize {
    4096
}

pub(crate) fn default_mmap_threshold() -> u64 {
    8 * 1024 * 1024
}

pub(crate) fn default_min_workers() -> usize {
    1
}

pub(crate) fn default_worker_adjust_interval_ms() -> u64 {
    2_000
}

pub(crate) fn default_memory_threshold() -> f64 {
    0.85
}

pub(crate) fn default_batch_size() -> usize {
    100
}

pub(crate) fn default_max_retries() -> u32 {
    2
}

pub(crate) fn default_retry_delay_ms() -> u64 {
    250
}

pub(crate) fn default_resource_check_interval_ms() -> u64 {
    1_000
}

pub(crate) fn default_max_errors_shown() -> usize {
    10
}

pub(crate) fn default_true() -> bool {
    true
}

/// Resolve a configured worker maximum, treating zero as "detected CPU count".
pub(crate) fn resolve_max_workers(configured: usize) -> usize {
    if configured >= 1 {
        return configured.min(MAX_WORKER_LIMIT);
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_WORKER_LIMIT)
}
