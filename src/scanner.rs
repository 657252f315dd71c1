//! Lazy directory traversal producing the file descriptors the pool hashes.
//!
//! The scanner is a pull-based iterator: directories are read one at a time
//! as the consumer advances, so very large trees never get materialized in
//! memory. Per-path failures (permission, vanished entries, link cycles) are
//! yielded inline as errors and never abort the walk; only a bad root is
//! fatal.

pub mod filter;
mod walk;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

use filter::CompiledFilter;
use walk::WalkState;

/// A file admitted by the filter, ready to be hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Per-path and root-level scan failures.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scan root is not a directory: {0}")]
    InvalidRoot(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The same real directory was reached a second time through a symlink.
    #[error("Link cycle at {path}: directory already visited via another path")]
    LinkCycle { path: PathBuf },
}

/// Iterator over qualifying files under a root.
///
/// Symbolic links are followed; a set of visited real paths stops cycles.
/// The sequence is finite and exhausted exactly once; re-invoking
/// [`Scanner::new`] restarts cleanly.
pub struct Scanner {
    filter: CompiledFilter,
    walk: WalkState,
    pending: VecDeque<Result<FileDescriptor, ScanError>>,
}

impl Scanner {
    /// Start a scan rooted at `root`. When `recursive` is false only the
    /// root's immediate children are considered.
    pub fn new(
        root: &Path,
        recursive: bool,
        filter: CompiledFilter,
    ) -> Result<Self, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::InvalidRoot(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|source| ScanError::Read {
                path: root.to_path_buf(),
                source,
            })?;
        Ok(Self {
            filter,
            walk: WalkState::new(root, recursive),
            pending: VecDeque::new(),
        })
    }
}

impl Iterator for Scanner {
    type Item = Result<FileDescriptor, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            let dir = self.walk.next_dir()?;
            self.walk.load_dir(&dir, &self.filter, &mut self.pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::filter::{CompiledFilter, FilterCriteria};
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn scan_paths(root: &Path, recursive: bool, filter: CompiledFilter) -> BTreeSet<PathBuf> {
        Scanner::new(root, recursive, filter)
            .unwrap()
            .filter_map(|item| item.ok())
            .map(|descriptor| descriptor.path)
            .collect()
    }

    fn file_names(paths: &BTreeSet<PathBuf>) -> BTreeSet<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn rejects_non_directory_root() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            Scanner::new(&file, true, CompiledFilter::accept_all()),
            Err(ScanError::InvalidRoot(_))
        ));
    }

    #[test]
    fn finds_nested_files_recursively() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top").unwrap();
        std::fs::write(nested.join("deep.txt"), b"deep").unwrap();

        let paths = scan_paths(dir.path(), true, CompiledFilter::accept_all());
        assert_eq!(
            file_names(&paths),
            BTreeSet::from(["top.txt".to_string(), "deep.txt".to_string()])
        );
    }

    #[test]
    fn shallow_scan_sees_only_immediate_children() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top").unwrap();
        std::fs::write(nested.join("deep.txt"), b"deep").unwrap();

        let paths = scan_paths(dir.path(), false, CompiledFilter::accept_all());
        assert_eq!(file_names(&paths), BTreeSet::from(["top.txt".to_string()]));
    }

    #[test]
    fn filter_criteria_apply_during_the_walk() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"keep").unwrap();
        std::fs::write(dir.path().join("drop.tmp"), b"drop").unwrap();
        let excluded = dir.path().join("skipped");
        std::fs::create_dir_all(&excluded).unwrap();
        std::fs::write(excluded.join("inside.txt"), b"inside").unwrap();

        let filter = CompiledFilter::compile(&FilterCriteria {
            excluded_extensions: vec!["tmp".to_string()],
            excluded_dirs: vec!["skipped".to_string()],
            ..FilterCriteria::default()
        })
        .unwrap();
        let paths = scan_paths(dir.path(), true, filter);
        assert_eq!(file_names(&paths), BTreeSet::from(["keep.txt".to_string()]));
    }

    #[test]
    fn descriptors_carry_size_and_modified_time() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), b"12345").unwrap();

        let descriptors: Vec<FileDescriptor> =
            Scanner::new(dir.path(), true, CompiledFilter::accept_all())
                .unwrap()
                .filter_map(|item| item.ok())
                .collect();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].size, 5);
        assert!(descriptors[0].modified <= SystemTime::now());
    }

    #[test]
    fn rescanning_an_unchanged_tree_yields_the_same_path_set() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("sub");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("one.txt"), b"one").unwrap();
        std::fs::write(nested.join("two.txt"), b"two").unwrap();

        let first = scan_paths(dir.path(), true, CompiledFilter::accept_all());
        let second = scan_paths(dir.path(), true, CompiledFilter::accept_all());
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_a_per_path_error_not_an_abort() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ok.txt"), b"ok").unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir_all(&locked).unwrap();
        std::fs::write(locked.join("secret.txt"), b"secret").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let items: Vec<_> = Scanner::new(dir.path(), true, CompiledFilter::accept_all())
            .unwrap()
            .collect();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        let found: Vec<_> = items.iter().filter(|item| item.is_ok()).collect();
        let errors: Vec<_> = items.iter().filter(|item| item.is_err()).collect();
        assert_eq!(found.len(), 1);
        assert!(!errors.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_are_reported_without_hanging() {
        use std::os::unix::fs as unix_fs;

        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("file.txt"), b"data").unwrap();
        unix_fs::symlink(dir.path(), nested.join("loop")).unwrap();

        let items: Vec<_> = Scanner::new(dir.path(), true, CompiledFilter::accept_all())
            .unwrap()
            .collect();
        let cycles = items
            .iter()
            .filter(|item| matches!(item, Err(ScanError::LinkCycle { .. })))
            .count();
        let files = items.iter().filter(|item| item.is_ok()).count();
        assert_eq!(cycles, 1);
        assert_eq!(files, 1);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_followed_once() {
        use std::os::unix::fs as unix_fs;

        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir_all(&real).unwrap();
        std::fs::write(real.join("inside.txt"), b"inside").unwrap();
        unix_fs::symlink(&real, dir.path().join("alias")).unwrap();

        let items: Vec<_> = Scanner::new(dir.path(), true, CompiledFilter::accept_all())
            .unwrap()
            .collect();
        let files = items.iter().filter(|item| item.is_ok()).count();
        assert_eq!(files, 1);
    }
}
