use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::filter::CompiledFilter;
use super::{FileDescriptor, ScanError};

/// Traversal bookkeeping: which directories remain and which real paths have
/// already been entered.
pub(super) struct WalkState {
    stack: Vec<PathBuf>,
    visited: HashSet<PathBuf>,
    recursive: bool,
}

impl WalkState {
    pub(super) fn new(root: PathBuf, recursive: bool) -> Self {
        let mut visited = HashSet::new();
        visited.insert(root.clone());
        Self {
            stack: vec![root],
            visited,
            recursive,
        }
    }

    pub(super) fn next_dir(&mut self) -> Option<PathBuf> {
        self.stack.pop()
    }

    /// Read one directory, queueing qualifying files, per-path errors, and
    /// (when recursive) subdirectories to visit later.
    pub(super) fn load_dir(
        &mut self,
        dir: &Path,
        filter: &CompiledFilter,
        out: &mut VecDeque<Result<FileDescriptor, ScanError>>,
    ) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(source) => {
                warn!(
                    dir = %dir.display(),
                    error = %source,
                    "Failed to read directory during scan"
                );
                out.push_back(Err(ScanError::Read {
                    path: dir.to_path_buf(),
                    source,
                }));
                return;
            }
        };

        for entry_result in entries {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(source) => {
                    out.push_back(Err(ScanError::Read {
                        path: dir.to_path_buf(),
                        source,
                    }));
                    continue;
                }
            };
            let path = entry.path();
            // Follows symlinks, so aliased files and link targets resolve.
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(source) => {
                    out.push_back(Err(ScanError::Read { path, source }));
                    continue;
                }
            };

            if metadata.is_dir() {
                if self.recursive {
                    self.enqueue_dir(path, filter, out);
                }
                continue;
            }
            if !metadata.is_file() {
                continue;
            }

            let Some(name) = file_name_of(&path) else {
                continue;
            };
            if !filter.qualifies(&name, metadata.len()) {
                continue;
            }
            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(source) => {
                    out.push_back(Err(ScanError::Read { path, source }));
                    continue;
                }
            };
            out.push_back(Ok(FileDescriptor {
                path,
                size: metadata.len(),
                modified,
            }));
        }
    }

    fn enqueue_dir(
        &mut self,
        path: PathBuf,
        filter: &CompiledFilter,
        out: &mut VecDeque<Result<FileDescriptor, ScanError>>,
    ) {
        let Some(name) = file_name_of(&path) else {
            return;
        };
        if filter.prune_dir(&name) {
            return;
        }
        let real = match path.canonicalize() {
            Ok(real) => real,
            Err(source) => {
                out.push_back(Err(ScanError::Read { path, source }));
                return;
            }
        };
        if !self.visited.insert(real) {
            out.push_back(Err(ScanError::LinkCycle { path }));
            return;
        }
        self.stack.push(path);
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
