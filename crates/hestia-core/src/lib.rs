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

//! # Hestia Core
//!
//! Foundational crate containing the function data model, the capability
//! contract every registered implementation satisfies, and the error
//! taxonomy shared by the rest of the workspace.

#![warn(missing_docs)]

pub mod capability;
pub mod circuit;
pub mod error;
pub mod execution;
pub mod function;
pub mod snapshot;
pub mod telemetry;

pub use capability::{CancellationToken, Capability, CapabilityError, FnCapability, Payload};
pub use circuit::{CircuitPhase, CircuitState};
pub use error::{ExecutionError, PersistenceError, RegistryError};
pub use execution::{ErrorKind, ExecutionRequest, ExecutionResult};
pub use function::{
    FunctionCategory, FunctionFilter, FunctionId, FunctionRecord, FunctionStatus, SecurityLevel,
};
pub use snapshot::{GlobalCounters, Snapshot, SnapshotVersion};
