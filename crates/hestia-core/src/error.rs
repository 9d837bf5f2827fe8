// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error taxonomy.
//!
//! Registry and validation errors are surfaced synchronously and never
//! retried. Execution errors carry enough context for circuit-breaker
//! accounting. Persistence errors are recoverable by the caller.

use crate::capability::CapabilityError;
use crate::execution::ErrorKind;
use crate::function::{FunctionId, FunctionStatus};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by registry and lifecycle operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// The id is already registered and replacement was not requested.
    #[error("function `{0}` is already registered")]
    DuplicateId(FunctionId),
    /// No function with this id is registered.
    #[error("function `{0}` not found")]
    NotFound(FunctionId),
    /// A required field is missing or malformed.
    #[error("invalid record `{id}`: {reason}")]
    InvalidRecord {
        /// The offending id, possibly empty.
        id: String,
        /// What is wrong with it.
        reason: String,
    },
    /// The state machine does not allow this transition.
    #[error("invalid transition for `{id}`: {from} -> {to}")]
    InvalidTransition {
        /// The function.
        id: FunctionId,
        /// Current status.
        from: FunctionStatus,
        /// Requested status.
        to: FunctionStatus,
    },
    /// Executions are in flight for the function.
    #[error("function `{id}` has {in_flight} execution(s) in flight")]
    InUse {
        /// The function.
        id: FunctionId,
        /// Number of running executions.
        in_flight: usize,
    },
    /// The emergency path was used for a function that does not allow it.
    #[error("function `{0}` is not eligible for emergency wake")]
    NotEmergencyEligible(FunctionId),
    /// Waking the function failed; it has been moved to `ERROR`.
    #[error("wake of `{id}` failed: {reason}")]
    WakeFailed {
        /// The function.
        id: FunctionId,
        /// Failure reported by the implementation.
        reason: String,
    },
}

/// Errors returned by the execution path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// No function with this id is registered.
    #[error("function `{0}` not found")]
    NotFound(FunctionId),
    /// The function is registered but has not been enabled.
    #[error("function `{0}` is not enabled")]
    NotEnabled(FunctionId),
    /// The function is administratively disabled.
    #[error("function `{0}` is disabled")]
    Disabled(FunctionId),
    /// The function is halted after a fault.
    #[error("function `{0}` is in the error state")]
    ErrorState(FunctionId),
    /// A concurrency ceiling was reached.
    #[error("function `{id}` rejected: concurrency limit {limit} reached")]
    Overloaded {
        /// The function.
        id: FunctionId,
        /// The ceiling that was hit.
        limit: usize,
    },
    /// The circuit breaker is open.
    #[error("circuit open for `{0}`")]
    CircuitOpen(FunctionId),
    /// The implementation did not finish in time.
    #[error("function `{id}` timed out after {timeout:?}")]
    TimedOut {
        /// The function.
        id: FunctionId,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// The caller cancelled the execution.
    #[error("execution of `{0}` was cancelled")]
    Cancelled(FunctionId),
    /// The implementation returned an error.
    #[error("function `{id}` failed: {source}")]
    ExecutionFailed {
        /// The function.
        id: FunctionId,
        /// The underlying error.
        #[source]
        source: CapabilityError,
    },
    /// The function was asleep and could not be woken.
    #[error("wake of `{id}` failed: {reason}")]
    WakeFailed {
        /// The function.
        id: FunctionId,
        /// Why the wake failed.
        reason: String,
    },
    /// A registry operation on the execution path failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ExecutionError {
    /// The failure classification for statistics and circuit accounting, or
    /// `None` if the implementation was never dispatched.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ExecutionError::TimedOut { .. } => Some(ErrorKind::TimedOut),
            ExecutionError::Cancelled(_) => Some(ErrorKind::Cancelled),
            ExecutionError::ExecutionFailed { .. } => Some(ErrorKind::ExecutionFailed),
            _ => None,
        }
    }

    /// Transient failures are the only ones a retry policy may act on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecutionError::TimedOut { .. } | ExecutionError::ExecutionFailed { .. }
        )
    }
}

/// Errors raised while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the snapshot file failed.
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file exists but cannot be decoded.
    #[error("corrupt snapshot at {path}: {reason}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },
    /// The file was written by an incompatible major version.
    #[error("unsupported snapshot version {found}, expected major {supported}")]
    UnsupportedVersion {
        /// Version found in the file.
        found: String,
        /// Major version this build reads.
        supported: u32,
    },
    /// The snapshot could not be encoded.
    #[error("failed to encode snapshot: {0}")]
    Encode(String),
}

impl PersistenceError {
    /// `true` when the file simply does not exist yet.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            PersistenceError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_kinds() {
        let id = FunctionId::new("f");
        assert_eq!(
            ExecutionError::TimedOut {
                id: id.clone(),
                timeout: Duration::from_millis(5)
            }
            .kind(),
            Some(ErrorKind::TimedOut)
        );
        assert_eq!(ExecutionError::CircuitOpen(id.clone()).kind(), None);
        assert!(ExecutionError::ExecutionFailed {
            id: id.clone(),
            source: CapabilityError::failed("boom")
        }
        .is_transient());
        assert!(!ExecutionError::Cancelled(id).is_transient());
    }

    #[test]
    fn test_registry_error_converts() {
        let err: ExecutionError = RegistryError::NotFound(FunctionId::new("x")).into();
        assert!(matches!(err, ExecutionError::Registry(RegistryError::NotFound(_))));
        assert_eq!(err.to_string(), "function `x` not found");
    }

    #[test]
    fn test_missing_file_detection() {
        let err = PersistenceError::Io {
            path: PathBuf::from("/nope"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.is_missing());
    }
}
