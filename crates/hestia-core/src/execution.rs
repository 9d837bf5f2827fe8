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

//! Execution request and result types.

use crate::capability::Payload;
use crate::function::FunctionId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Why a dispatched execution did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The implementation did not complete within its timeout.
    TimedOut,
    /// The caller cancelled the execution.
    Cancelled,
    /// The implementation returned an error.
    ExecutionFailed,
}

/// A request to invoke a registered function.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Target function.
    pub function_id: FunctionId,
    /// Opaque arguments passed through to the implementation.
    pub arguments: Payload,
    /// Submission time.
    pub requested_at: SystemTime,
    /// Maximum time the implementation may run.
    pub timeout: Duration,
}

impl ExecutionRequest {
    /// Creates a request stamped with the current time.
    pub fn new(function_id: impl Into<FunctionId>, arguments: Payload, timeout: Duration) -> Self {
        Self {
            function_id: function_id.into(),
            arguments,
            requested_at: SystemTime::now(),
            timeout,
        }
    }
}

/// Outcome of one dispatched execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// The function that ran.
    pub function_id: FunctionId,
    /// `true` if the implementation returned successfully.
    pub success: bool,
    /// Output on success.
    pub output: Option<Payload>,
    /// Failure classification otherwise.
    pub error_kind: Option<ErrorKind>,
    /// Wall time from dispatch to completion (or abandonment).
    pub duration: Duration,
    /// Completion time.
    pub completed_at: SystemTime,
}

impl ExecutionResult {
    /// A successful outcome.
    pub fn succeeded(function_id: FunctionId, output: Payload, duration: Duration) -> Self {
        Self {
            function_id,
            success: true,
            output: Some(output),
            error_kind: None,
            duration,
            completed_at: SystemTime::now(),
        }
    }

    /// A failed outcome.
    pub fn failed(function_id: FunctionId, kind: ErrorKind, duration: Duration) -> Self {
        Self {
            function_id,
            success: false,
            output: None,
            error_kind: Some(kind),
            duration,
            completed_at: SystemTime::now(),
        }
    }
}
