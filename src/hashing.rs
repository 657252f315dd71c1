//! Per-file digest computation.
//!
//! Small files are read in fixed-size chunks through an incremental digest;
//! files above the mmap threshold are mapped and digested in large passes to
//! avoid per-chunk syscall overhead. Both paths produce identical digests for
//! identical content; the split is purely a performance decision.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use md5::Md5;
use memmap2::Mmap;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

/// Digest algorithms selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 5] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Blake3,
    ];

    /// Parse an algorithm name, case-insensitively, accepting common
    /// dashed spellings ("sha-256").
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            "blake3" => Some(Self::Blake3),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure classification for a single hashing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashErrorKind {
    /// The file disappeared between scan and hash. Terminal.
    NotFound,
    /// Access denied. Terminal; retrying cannot change the outcome.
    PermissionDenied,
    /// Read failure mid-stream. Worth retrying.
    Io,
    /// Caller asked for an algorithm this build does not know. Terminal.
    UnsupportedAlgorithm,
}

impl HashErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::PermissionDenied => "permission-denied",
            Self::Io => "io",
            Self::UnsupportedAlgorithm => "unsupported-algorithm",
        }
    }
}

/// Error from one attempt to hash one file.
#[derive(Debug, Error)]
#[error("Failed to hash {path}: {message}")]
pub struct HashError {
    pub path: PathBuf,
    pub kind: HashErrorKind,
    pub message: String,
}

impl HashError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        let kind = match source.kind() {
            std::io::ErrorKind::NotFound => HashErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => HashErrorKind::PermissionDenied,
            _ => HashErrorKind::Io,
        };
        Self {
            path: path.to_path_buf(),
            kind,
            message: source.to_string(),
        }
    }
}

/// Incremental digest state, dispatching on the selected algorithm.
enum DigestState {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(Md5::new()),
            HashAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(hasher) => hasher.update(data),
            Self::Sha1(hasher) => hasher.update(data),
            Self::Sha256(hasher) => hasher.update(data),
            Self::Sha512(hasher) => hasher.update(data),
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(hasher) => to_hex(&hasher.finalize()),
            Self::Sha1(hasher) => to_hex(&hasher.finalize()),
            Self::Sha256(hasher) => to_hex(&hasher.finalize()),
            Self::Sha512(hasher) => to_hex(&hasher.finalize()),
            Self::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Hash a file by name, failing immediately on an unknown algorithm.
pub fn hash_file_by_name(
    path: &Path,
    algorithm: &str,
    chunk_size: usize,
    mmap_threshold: u64,
) -> Result<String, HashError> {
    let Some(algorithm) = HashAlgorithm::parse(algorithm) else {
        return Err(HashError {
            path: path.to_path_buf(),
            kind: HashErrorKind::UnsupportedAlgorithm,
            message: format!("unknown algorithm {algorithm:?}"),
        });
    };
    hash_file(path, algorithm, chunk_size, mmap_threshold)
}

/// Compute the hex digest of a file's content.
///
/// Files at or below `mmap_threshold` bytes are read in `chunk_size` blocks;
/// larger files are memory-mapped. Zero-byte files yield the algorithm's
/// empty-input digest.
pub fn hash_file(
    path: &Path,
    algorithm: HashAlgorithm,
    chunk_size: usize,
    mmap_threshold: u64,
) -> Result<String, HashError> {
    let file = File::open(path).map_err(|source| HashError::from_io(path, source))?;
    let metadata = file
        .metadata()
        .map_err(|source| HashError::from_io(path, source))?;
    if metadata.len() > mmap_threshold {
        hash_mapped(&file, path, algorithm)
    } else {
        hash_chunked(file, path, algorithm, chunk_size)
    }
}

fn hash_chunked(
    mut file: File,
    path: &Path,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> Result<String, HashError> {
    let mut state = DigestState::new(algorithm);
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|source| HashError::from_io(path, source))?;
        if read == 0 {
            break;
        }
        state.update(&buffer[..read]);
    }
    Ok(state.finalize_hex())
}

fn hash_mapped(file: &File, path: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
    // Safety: the mapping is read-only and dropped before the file handle.
    // Concurrent truncation of the underlying file can fault the process on
    // any OS; the same window exists for buffered reads returning torn data.
    let mapped = unsafe { Mmap::map(file) }.map_err(|source| HashError::from_io(path, source))?;
    let mut state = DigestState::new(algorithm);
    state.update(&mapped);
    Ok(state.finalize_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_algorithm_names_loosely() {
        assert_eq!(HashAlgorithm::parse("MD5"), Some(HashAlgorithm::Md5));
        assert_eq!(HashAlgorithm::parse("sha-256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::parse("SHA512"), Some(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::parse("blake3"), Some(HashAlgorithm::Blake3));
        assert_eq!(HashAlgorithm::parse("crc32"), None);
    }

    #[test]
    fn known_digest_values() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "abc.txt", b"abc");
        assert_eq!(
            hash_file(&path, HashAlgorithm::Md5, 4096, u64::MAX).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            hash_file(&path, HashAlgorithm::Sha1, 4096, u64::MAX).unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            hash_file(&path, HashAlgorithm::Sha256, 4096, u64::MAX).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_files_hash_to_the_empty_input_digest() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "empty", b"");
        assert_eq!(
            hash_file(&path, HashAlgorithm::Md5, 4096, 0).unwrap(),
            EMPTY_MD5
        );
        assert_eq!(
            hash_file(&path, HashAlgorithm::Sha256, 4096, 0).unwrap(),
            EMPTY_SHA256
        );
    }

    #[test]
    fn chunked_and_mapped_paths_agree() {
        let dir = tempdir().unwrap();
        let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let path = write_file(&dir, "large.bin", &content);

        for algorithm in HashAlgorithm::ALL {
            // Threshold above the file size forces the chunked path; below
            // forces the mapped path.
            let chunked = hash_file(&path, algorithm, 1024, u64::MAX).unwrap();
            let mapped = hash_file(&path, algorithm, 1024, 1).unwrap();
            assert_eq!(chunked, mapped, "digest mismatch for {algorithm}");
        }
    }

    #[test]
    fn digest_is_independent_of_chunk_size() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "data.bin", &[7u8; 10_000]);
        let small = hash_file(&path, HashAlgorithm::Sha256, 16, u64::MAX).unwrap();
        let large = hash_file(&path, HashAlgorithm::Sha256, 1 << 20, u64::MAX).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn missing_file_is_terminal_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vanished.txt");
        let err = hash_file(&path, HashAlgorithm::Md5, 4096, u64::MAX).unwrap_err();
        assert_eq!(err.kind, HashErrorKind::NotFound);
        assert!(!err.kind.is_retryable());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_terminal_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = write_file(&dir, "locked.txt", b"locked");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000)).unwrap();
        let err = hash_file(&path, HashAlgorithm::Md5, 4096, u64::MAX).unwrap_err();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert_eq!(err.kind, HashErrorKind::PermissionDenied);
        assert!(!err.kind.is_retryable());
    }

    #[test]
    fn unknown_algorithm_fails_immediately_by_name() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "x.txt", b"x");
        let err = hash_file_by_name(&path, "whirlpool", 4096, u64::MAX).unwrap_err();
        assert_eq!(err.kind, HashErrorKind::UnsupportedAlgorithm);
        assert!(!err.kind.is_retryable());
    }

    #[test]
    fn io_errors_are_classified_retryable() {
        assert!(HashErrorKind::Io.is_retryable());
        assert!(!HashErrorKind::NotFound.is_retryable());
        assert!(!HashErrorKind::PermissionDenied.is_retryable());
        assert!(!HashErrorKind::UnsupportedAlgorithm.is_retryable());
    }
}
