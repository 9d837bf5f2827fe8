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

//! The persisted aggregate of registry state.

use crate::function::{FunctionId, FunctionRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Major version of the snapshot document. Readers reject other majors.
pub const SNAPSHOT_FORMAT_MAJOR: u32 = 1;
/// Minor version of the snapshot document. Readers accept any minor.
pub const SNAPSHOT_FORMAT_MINOR: u32 = 0;

/// Document format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotVersion {
    /// Incompatible changes.
    pub major: u32,
    /// Additive changes.
    pub minor: u32,
}

impl Default for SnapshotVersion {
    fn default() -> Self {
        Self {
            major: SNAPSHOT_FORMAT_MAJOR,
            minor: SNAPSHOT_FORMAT_MINOR,
        }
    }
}

impl SnapshotVersion {
    /// `true` if this build can read documents of this version.
    pub fn is_supported(&self) -> bool {
        self.major == SNAPSHOT_FORMAT_MAJOR
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Process-wide counters carried across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalCounters {
    /// Dispatched executions.
    pub total_executions: u64,
    /// Failed executions (including timeouts and cancellations).
    pub total_failures: u64,
    /// Executions that timed out.
    pub total_timeouts: u64,
    /// Requests rejected before dispatch (overload, open circuit).
    pub total_rejections: u64,
    /// Successful wakes.
    pub total_wakes: u64,
    /// Transitions to sleep.
    pub total_sleeps: u64,
    /// Alerts raised.
    pub total_alerts: u64,
}

/// A versioned capture of every function record plus global counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Format version.
    pub version: SnapshotVersion,
    /// Capture time.
    pub taken_at: SystemTime,
    /// Global counters.
    pub counters: GlobalCounters,
    /// Records keyed by function id.
    pub functions: BTreeMap<FunctionId, FunctionRecord>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SnapshotVersion::default(),
            taken_at: SystemTime::UNIX_EPOCH,
            counters: GlobalCounters::default(),
            functions: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    /// Builds a snapshot stamped with the current time.
    pub fn new(
        counters: GlobalCounters,
        records: impl IntoIterator<Item = FunctionRecord>,
    ) -> Self {
        Self {
            version: SnapshotVersion::default(),
            taken_at: SystemTime::now(),
            counters,
            functions: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// `true` if the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Looks up a record.
    pub fn get(&self, id: &str) -> Option<&FunctionRecord> {
        self.functions.get(id)
    }
}
