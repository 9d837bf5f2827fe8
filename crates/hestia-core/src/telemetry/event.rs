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

//! Events flowing from the execution path to the monitoring bridge.

use crate::execution::ErrorKind;
use crate::function::FunctionId;
use crate::telemetry::signal::Alert;
use std::time::Duration;

/// Why a request was rejected before reaching its implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// A concurrency ceiling was reached.
    Overloaded,
    /// The circuit breaker was open.
    CircuitOpen,
}

/// Externally supplied resource metrics (CPU, memory) for the host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceReport {
    /// Overall CPU load (0.0 to 1.0).
    pub cpu_load: f32,
    /// Memory pressure (0.0 to 1.0).
    pub memory_load: f32,
}

/// A telemetry event produced by the core or by an external sensor.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// An execution completed (successfully or not).
    ExecutionCompleted {
        /// The function that ran.
        function_id: FunctionId,
        /// Whether it succeeded.
        success: bool,
        /// Failure classification.
        error_kind: Option<ErrorKind>,
        /// Dispatch-to-completion time.
        duration: Duration,
    },
    /// A request was rejected before dispatch.
    Rejected {
        /// The target function.
        function_id: FunctionId,
        /// Why.
        reason: RejectionReason,
    },
    /// A host resource report.
    ResourceReport(ResourceReport),
    /// An alert raised by the core.
    Alert(Alert),
}
