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

//! # Hestia
//!
//! A function manager for long-running services. Subsystems register named
//! capabilities; callers execute them by id under timeouts, circuit
//! breaking and a global concurrency ceiling; idle functions are put to
//! sleep and woken on demand; state survives restarts through snapshots.
//!
//! ```no_run
//! use hestia_sdk::prelude::*;
//! use std::time::Duration;
//!
//! let mut manager = FunctionManager::open(HestiaConfig::default())?;
//! manager.start()?;
//! manager.register_fn(FunctionRecord::new("echo", "Echo"), |args, _| Ok(args.clone()))?;
//! let result = manager.execute("echo", Payload::from("hi"), Duration::from_secs(1))?;
//! assert!(result.success);
//! manager.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod persistence;

pub use config::{ConfigError, HestiaConfig, PersistenceConfig};
pub use error::HestiaError;
pub use manager::FunctionManager;
pub use persistence::Persister;

pub mod prelude {
    pub use crate::{FunctionManager, HestiaConfig, HestiaError};
    pub use hestia_control::{MetricsReport, ReportScope};
    pub use hestia_core::telemetry::{Alert, AlertSeverity, ResourceReport};
    pub use hestia_core::{
        CancellationToken, Capability, CapabilityError, ExecutionError, ExecutionRequest,
        ExecutionResult, FunctionCategory, FunctionFilter, FunctionId, FunctionRecord,
        FunctionStatus, Payload, RegistryError, SecurityLevel,
    };
}
