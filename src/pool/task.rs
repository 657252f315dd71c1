//! Per-task retry state machine.
//!
//! A task moves `Pending → Running → Succeeded`, or through
//! `Failed(retryable) → Pending` with an incremented attempt count until the
//! retry budget is spent, or straight to `Failed(terminal)` for failures that
//! retrying cannot fix. Keeping the classification here, away from the
//! threads, makes attempt accounting testable in isolation.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::hashing::{HashAlgorithm, HashError, HashErrorKind};
use crate::scanner::FileDescriptor;

/// One unit of hashing work, carrying its attempt count across retries.
#[derive(Debug)]
pub struct HashTask {
    pub descriptor: FileDescriptor,
    pub algorithm: HashAlgorithm,
    pub attempts: u32,
}

impl HashTask {
    pub fn new(descriptor: FileDescriptor, algorithm: HashAlgorithm) -> Self {
        Self {
            descriptor,
            algorithm,
            attempts: 0,
        }
    }
}

/// Successful terminal result for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct HashResult {
    pub path: PathBuf,
    pub size: u64,
    pub algorithm: HashAlgorithm,
    pub digest: String,
    pub modified: SystemTime,
    pub elapsed: Duration,
}

/// Terminal failure for one file, after any retries.
#[derive(Debug, Clone, PartialEq)]
pub struct HashFailure {
    pub path: PathBuf,
    pub kind: HashErrorKind,
    pub message: String,
    /// Number of hashing attempts actually performed.
    pub attempts: u32,
}

/// Exactly one of these is produced per admitted descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(HashResult),
    Failure(HashFailure),
}

impl TaskOutcome {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Success(result) => &result.path,
            Self::Failure(failure) => &failure.path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Where a task goes after one execution.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Done(TaskOutcome),
    /// Back to pending with the attempt recorded; the error is kept so a
    /// cancellation during the retry wait can still settle the task.
    Retry { task: HashTask, error: HashError },
}

/// Record one execution of `task` and classify what happens next.
///
/// Retryable failures go back to pending while `attempts <= max_retries`,
/// allowing `max_retries + 1` executions in total. Terminal failures carry
/// the final attempt count.
pub(crate) fn settle_attempt(
    mut task: HashTask,
    result: Result<String, HashError>,
    elapsed: Duration,
    max_retries: u32,
) -> AttemptOutcome {
    task.attempts += 1;
    match result {
        Ok(digest) => AttemptOutcome::Done(TaskOutcome::Success(HashResult {
            path: task.descriptor.path,
            size: task.descriptor.size,
            algorithm: task.algorithm,
            digest,
            modified: task.descriptor.modified,
            elapsed,
        })),
        Err(error) if error.kind.is_retryable() && task.attempts <= max_retries => {
            AttemptOutcome::Retry { task, error }
        }
        Err(error) => AttemptOutcome::Done(TaskOutcome::Failure(HashFailure {
            path: task.descriptor.path,
            kind: error.kind,
            message: error.message,
            attempts: task.attempts,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> FileDescriptor {
        FileDescriptor {
            path: PathBuf::from("/data/file.bin"),
            size: 42,
            modified: SystemTime::UNIX_EPOCH,
        }
    }

    fn task() -> HashTask {
        HashTask::new(descriptor(), HashAlgorithm::Sha256)
    }

    fn io_error() -> HashError {
        HashError {
            path: PathBuf::from("/data/file.bin"),
            kind: HashErrorKind::Io,
            message: "read interrupted".to_string(),
        }
    }

    fn terminal_error(kind: HashErrorKind) -> HashError {
        HashError {
            path: PathBuf::from("/data/file.bin"),
            kind,
            message: "gone".to_string(),
        }
    }

    fn run_to_completion(
        mut task: HashTask,
        mut attempt_results: Vec<Result<String, HashError>>,
        max_retries: u32,
    ) -> TaskOutcome {
        attempt_results.reverse();
        loop {
            let result = attempt_results.pop().expect("ran out of scripted results");
            match settle_attempt(task, result, Duration::ZERO, max_retries) {
                AttemptOutcome::Done(outcome) => return outcome,
                AttemptOutcome::Retry { task: next, .. } => task = next,
            }
        }
    }

    #[test]
    fn success_on_first_attempt() {
        let outcome = run_to_completion(task(), vec![Ok("abc123".to_string())], 2);
        match outcome {
            TaskOutcome::Success(result) => {
                assert_eq!(result.digest, "abc123");
                assert_eq!(result.size, 42);
            }
            TaskOutcome::Failure(failure) => panic!("unexpected failure: {failure:?}"),
        }
    }

    #[test]
    fn io_failures_up_to_max_retries_then_success_still_succeeds() {
        let max_retries = 3;
        let mut results: Vec<Result<String, HashError>> =
            (0..max_retries).map(|_| Err(io_error())).collect();
        results.push(Ok("deadbeef".to_string()));
        let outcome = run_to_completion(task(), results, max_retries);
        assert!(outcome.is_success());
    }

    #[test]
    fn one_failure_past_the_retry_budget_is_terminal_with_full_attempt_count() {
        let max_retries = 3;
        let results: Vec<Result<String, HashError>> =
            (0..=max_retries).map(|_| Err(io_error())).collect();
        let outcome = run_to_completion(task(), results, max_retries);
        match outcome {
            TaskOutcome::Failure(failure) => {
                assert_eq!(failure.attempts, max_retries + 1);
                assert_eq!(failure.kind, HashErrorKind::Io);
            }
            TaskOutcome::Success(result) => panic!("unexpected success: {result:?}"),
        }
    }

    #[test]
    fn not_found_and_permission_denied_never_retry() {
        for kind in [HashErrorKind::NotFound, HashErrorKind::PermissionDenied] {
            let outcome = run_to_completion(task(), vec![Err(terminal_error(kind))], 5);
            match outcome {
                TaskOutcome::Failure(failure) => {
                    assert_eq!(failure.attempts, 1);
                    assert_eq!(failure.kind, kind);
                }
                TaskOutcome::Success(result) => panic!("unexpected success: {result:?}"),
            }
        }
    }

    #[test]
    fn unsupported_algorithm_is_immediately_terminal() {
        let outcome = run_to_completion(
            task(),
            vec![Err(terminal_error(HashErrorKind::UnsupportedAlgorithm))],
            5,
        );
        match outcome {
            TaskOutcome::Failure(failure) => assert_eq!(failure.attempts, 1),
            TaskOutcome::Success(result) => panic!("unexpected success: {result:?}"),
        }
    }

    #[test]
    fn zero_max_retries_makes_io_failures_terminal_on_first_attempt() {
        let outcome = run_to_completion(task(), vec![Err(io_error())], 0);
        match outcome {
            TaskOutcome::Failure(failure) => {
                assert_eq!(failure.attempts, 1);
            }
            TaskOutcome::Success(result) => panic!("unexpected success: {result:?}"),
        }
    }
}
