//! Resolved configuration bundle consumed by the hashing engine.
//!
//! The engine does not care where these values came from; callers may load
//! them from a TOML file, override them from the command line, or construct
//! them directly. Validation is fail-fast: a bad pattern or numeric bound
//! aborts before any scanning begins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config_defaults::{
    default_algorithm, default_batch_size, default_chunk_size, default_max_errors_shown,
    default_max_retries, default_memory_threshold, default_min_workers, default_mmap_threshold,
    default_resource_check_interval_ms, default_retry_delay_ms, default_true,
    default_worker_adjust_interval_ms, resolve_max_workers,
};
use crate::hashing::HashAlgorithm;
use crate::scanner::filter::{CompiledFilter, FilterCriteria, FilterError};

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Fully resolved settings for one engine run.
///
/// Config keys (TOML): `algorithm`, `chunk_size`, `mmap_threshold`,
/// `min_workers`, `max_workers` (0 = detected CPU count), intervals in
/// milliseconds, `memory_threshold` as a fraction of total memory,
/// `batch_size`, `max_retries`, `retry_delay_ms`, `max_errors_shown`,
/// `recursive`, and a `[filter]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_mmap_threshold")]
    pub mmap_threshold: u64,
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    /// Upper worker bound; zero means "use the detected CPU count".
    #[serde(default)]
    pub max_workers: usize,
    #[serde(default = "default_worker_adjust_interval_ms")]
    pub worker_adjust_interval_ms: u64,
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_resource_check_interval_ms")]
    pub resource_check_interval_ms: u64,
    #[serde(default = "default_max_errors_shown")]
    pub max_errors_shown: usize,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub filter: FilterCriteria,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            chunk_size: default_chunk_size(),
            mmap_threshold: default_mmap_threshold(),
            min_workers: default_min_workers(),
            max_workers: 0,
            worker_adjust_interval_ms: default_worker_adjust_interval_ms(),
            memory_threshold: default_memory_threshold(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            resource_check_interval_ms: default_resource_check_interval_ms(),
            max_errors_shown: default_max_errors_shown(),
            recursive: true,
            filter: FilterCriteria::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every numeric bound and compile every pattern once.
    ///
    /// A configuration that passes here will not abort the run later for
    /// configuration reasons.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_algorithm()?;
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunk_size",
                reason: "must be at least 1 byte".to_string(),
            });
        }
        if self.min_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_workers != 0 && self.max_workers < self.min_workers {
            return Err(ConfigError::InvalidValue {
                field: "max_workers",
                reason: format!(
                    "must be 0 (auto) or >= min_workers ({})",
                    self.min_workers
                ),
            });
        }
        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "memory_threshold",
                reason: "must be a fraction in (0.0, 1.0]".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        CompiledFilter::compile(&self.filter)?;
        Ok(())
    }

    /// Parse the configured algorithm name.
    pub fn parsed_algorithm(&self) -> Result<HashAlgorithm, ConfigError> {
        HashAlgorithm::parse(&self.algorithm)
            .ok_or_else(|| ConfigError::UnknownAlgorithm(self.algorithm.clone()))
    }

    /// Worker maximum with zero resolved to the detected CPU count.
    pub fn effective_max_workers(&self) -> usize {
        resolve_max_workers(self.max_workers).max(self.min_workers)
    }

    pub fn worker_adjust_interval(&self) -> Duration {
        Duration::from_millis(self.worker_adjust_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn resource_check_interval(&self) -> Duration {
        Duration::from_millis(self.resource_check_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_pass_validation() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let config = EngineConfig {
            chunk_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "chunk_size",
                ..
            })
        ));
    }

    #[test]
    fn rejects_max_workers_below_min() {
        let config = EngineConfig {
            min_workers: 4,
            max_workers: 2,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_memory_threshold_out_of_range() {
        for bad in [0.0, -0.2, 1.5] {
            let config = EngineConfig {
                memory_threshold: bad,
                ..EngineConfig::default()
            };
            assert!(config.validate().is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let config = EngineConfig {
            algorithm: "crc1337".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn rejects_bad_filter_pattern_before_scanning() {
        let config = EngineConfig {
            filter: FilterCriteria {
                include: vec!["[unclosed".to_string()],
                ..FilterCriteria::default()
            },
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Filter(_))));
    }

    #[test]
    fn zero_max_workers_resolves_to_cpu_count() {
        let config = EngineConfig::default();
        assert!(config.effective_max_workers() >= 1);
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashscan.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "algorithm = \"sha256\"").unwrap();
        writeln!(file, "[filter]").unwrap();
        writeln!(file, "exclude = [\"*.tmp\"]").unwrap();
        drop(file);

        let config = EngineConfig::load_from_path(&path).unwrap();
        assert_eq!(config.algorithm, "sha256");
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.filter.exclude, vec!["*.tmp".to_string()]);
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashscan.toml");
        std::fs::write(&path, "algorithm = [not toml").unwrap();
        assert!(matches!(
            EngineConfig::load_from_path(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
