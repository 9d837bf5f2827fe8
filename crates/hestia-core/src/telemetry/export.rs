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

//! The seam through which aggregated metrics leave the core.

use crate::function::FunctionRecord;
use crate::snapshot::GlobalCounters;

/// A point-in-time view of everything the monitoring collaborator exports.
#[derive(Debug, Clone, Default)]
pub struct MetricsSample {
    /// Global counters at sampling time.
    pub counters: GlobalCounters,
    /// Current records of every registered function.
    pub functions: Vec<FunctionRecord>,
    /// Current global concurrency ceiling.
    pub concurrency_ceiling: usize,
    /// Executions currently holding a concurrency slot.
    pub running: usize,
    /// Number of circuits that are open or half-open.
    pub open_circuits: usize,
    /// Last reported CPU load (0.0 to 1.0).
    pub cpu_load: f32,
    /// Last reported memory load (0.0 to 1.0).
    pub memory_load: f32,
}

/// Receives metrics samples from the monitoring bridge.
///
/// Implementations must not block for long: `publish` runs on the bridge's
/// analysis thread.
pub trait MetricsSink: Send + Sync {
    /// Publishes one sample.
    fn publish(&self, sample: &MetricsSample);
}
