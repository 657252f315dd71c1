//! Pure predicate logic deciding which discovered paths qualify for hashing.
//!
//! Criteria are compiled once per run; a pattern that fails to compile aborts
//! the run before any scanning starts, rather than silently matching nothing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File names ignored when system-file suppression is enabled.
const SYSTEM_FILE_NAMES: &[&str] = &["thumbs.db", "desktop.ini", ".ds_store", "ehthumbs.db"];

/// User-facing filter settings, as they arrive from config or CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Inclusive lower size bound in bytes; unset means unbounded.
    #[serde(default)]
    pub min_size: Option<u64>,
    /// Inclusive upper size bound in bytes; unset means unbounded.
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Interpret patterns as regular expressions instead of globs.
    #[serde(default)]
    pub use_regex: bool,
    #[serde(default)]
    pub skip_hidden: bool,
    #[serde(default)]
    pub skip_system: bool,
    /// Directory names pruned before descending.
    #[serde(default)]
    pub excluded_dirs: Vec<String>,
    /// File extensions (with or without leading dot) that never qualify.
    #[serde(default)]
    pub excluded_extensions: Vec<String>,
}

/// Errors raised while compiling filter criteria.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid glob pattern {pattern:?}: {source}")]
    Glob {
        pattern: String,
        source: glob::PatternError,
    },
    #[error("Invalid regex pattern {pattern:?}: {source}")]
    Regex {
        pattern: String,
        source: Box<regex::Error>,
    },
    #[error("min_size ({min}) exceeds max_size ({max})")]
    Bounds { min: u64, max: u64 },
}

enum PatternSet {
    Globs(Vec<glob::Pattern>),
    Regexes(Vec<regex::Regex>),
}

impl PatternSet {
    fn compile(patterns: &[String], use_regex: bool) -> Result<Self, FilterError> {
        if use_regex {
            let mut compiled = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                compiled.push(regex::Regex::new(pattern).map_err(|source| {
                    FilterError::Regex {
                        pattern: pattern.clone(),
                        source: Box::new(source),
                    }
                })?);
            }
            Ok(Self::Regexes(compiled))
        } else {
            let mut compiled = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                compiled.push(glob::Pattern::new(pattern).map_err(|source| {
                    FilterError::Glob {
                        pattern: pattern.clone(),
                        source,
                    }
                })?);
            }
            Ok(Self::Globs(compiled))
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Globs(patterns) => patterns.is_empty(),
            Self::Regexes(patterns) => patterns.is_empty(),
        }
    }

    /// Patterns match against the file name only, never the full path, so
    /// matches survive relocating the tree.
    fn matches(&self, file_name: &str) -> bool {
        match self {
            Self::Globs(patterns) => patterns.iter().any(|p| p.matches(file_name)),
            Self::Regexes(patterns) => patterns.iter().any(|p| p.is_match(file_name)),
        }
    }
}

/// Compiled form of [`FilterCriteria`], ready for per-path checks.
pub struct CompiledFilter {
    min_size: Option<u64>,
    max_size: Option<u64>,
    include: PatternSet,
    exclude: PatternSet,
    skip_hidden: bool,
    skip_system: bool,
    excluded_dirs: HashSet<String>,
    excluded_extensions: HashSet<String>,
}

impl CompiledFilter {
    /// Compile criteria, failing fast on any bad pattern or bound.
    pub fn compile(criteria: &FilterCriteria) -> Result<Self, FilterError> {
        if let (Some(min), Some(max)) = (criteria.min_size, criteria.max_size)
            && min > max
        {
            return Err(FilterError::Bounds { min, max });
        }
        Ok(Self {
            min_size: criteria.min_size,
            max_size: criteria.max_size,
            include: PatternSet::compile(&criteria.include, criteria.use_regex)?,
            exclude: PatternSet::compile(&criteria.exclude, criteria.use_regex)?,
            skip_hidden: criteria.skip_hidden,
            skip_system: criteria.skip_system,
            excluded_dirs: criteria.excluded_dirs.iter().cloned().collect(),
            excluded_extensions: criteria
                .excluded_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        })
    }

    /// An unrestricted filter that admits every file.
    pub fn accept_all() -> Self {
        Self {
            min_size: None,
            max_size: None,
            include: PatternSet::Globs(Vec::new()),
            exclude: PatternSet::Globs(Vec::new()),
            skip_hidden: false,
            skip_system: false,
            excluded_dirs: HashSet::new(),
            excluded_extensions: HashSet::new(),
        }
    }

    /// Decide whether a file qualifies. Exclude rules win over include rules.
    pub fn qualifies(&self, file_name: &str, size: u64) -> bool {
        if let Some(min) = self.min_size
            && size < min
        {
            return false;
        }
        if let Some(max) = self.max_size
            && size > max
        {
            return false;
        }
        if self.skip_hidden && is_hidden(file_name) {
            return false;
        }
        if self.skip_system && is_system_file(file_name) {
            return false;
        }
        if !self.excluded_extensions.is_empty()
            && let Some(ext) = extension_of(file_name)
            && self.excluded_extensions.contains(&ext)
        {
            return false;
        }
        if self.exclude.matches(file_name) {
            return false;
        }
        if !self.include.is_empty() && !self.include.matches(file_name) {
            return false;
        }
        true
    }

    /// True when a directory should be pruned before descending into it.
    pub fn prune_dir(&self, dir_name: &str) -> bool {
        if self.excluded_dirs.contains(dir_name) {
            return true;
        }
        self.skip_hidden && is_hidden(dir_name)
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_system_file(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    SYSTEM_FILE_NAMES.contains(&lowered.as_str())
}

fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        // Dotfiles like ".gitignore" have no extension.
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
