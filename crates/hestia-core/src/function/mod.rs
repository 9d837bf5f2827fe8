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

//! The function data model.
//!
//! A [`FunctionRecord`] is the registry's view of one registered capability:
//! descriptive metadata, the lifecycle status, and the runtime counters
//! maintained by the execution path. The implementation itself is held
//! beside the record by the registry and never appears in it.

mod status;

pub use status::FunctionStatus;

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::time::SystemTime;

/// Unique, stable key of a registered function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(String);

impl FunctionId {
    /// Creates an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FunctionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FunctionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for FunctionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Broad classification of a function, used for filtering and for
/// per-category sleep thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCategory {
    /// Coordinates other subsystems.
    Manager,
    /// Bridges to an external service.
    Integration,
    /// Configuration provider.
    Config,
    /// Security scanning, auditing, or protection.
    SecurityService,
    /// Monitoring and diagnostics.
    Monitoring,
    /// Resource or performance optimisation.
    Optimization,
    /// Anything else, including categories written by newer versions.
    #[default]
    #[serde(other)]
    Other,
}

/// Sensitivity of a function, set by the administrative surface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// No special handling.
    #[default]
    Low,
    /// Moderately sensitive.
    Medium,
    /// Sensitive.
    High,
    /// Highly sensitive.
    Critical,
}

/// Metadata, lifecycle status, and counters of a registered function.
///
/// Unknown fields in a persisted record are ignored and missing fields take
/// their defaults, so documents written by neighbouring minor versions load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionRecord {
    /// Unique key.
    pub id: FunctionId,
    /// Human-readable name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Classification.
    pub category: FunctionCategory,
    /// Sensitivity.
    pub security_level: SecurityLevel,
    /// Lifecycle status.
    pub status: FunctionStatus,
    /// Critical functions are never put to sleep automatically.
    pub is_critical: bool,
    /// Move to `ACTIVE` immediately on registration.
    pub auto_enable: bool,
    /// May be woken through the emergency path.
    pub emergency_wake_eligible: bool,
    /// Optional per-function concurrency ceiling.
    pub max_concurrency: Option<usize>,
    /// Registration time.
    pub created_at: SystemTime,
    /// Completion time of the most recent execution.
    pub last_executed_at: Option<SystemTime>,
    /// Set while the function is `SLEEPING`.
    pub sleep_since: Option<SystemTime>,
    /// Number of successful wakes.
    pub wake_count: u64,
    /// Number of dispatched executions.
    pub execution_count: u64,
    /// Number of failed executions; never exceeds `execution_count`.
    pub failure_count: u64,
    /// Exponential moving average of execution duration, in milliseconds.
    pub average_duration_ms: f64,
    /// Exponential moving average of success (1.0 = always succeeds).
    pub quality_score: f64,
}

impl Default for FunctionRecord {
    fn default() -> Self {
        Self {
            id: FunctionId::default(),
            name: String::new(),
            description: String::new(),
            category: FunctionCategory::default(),
            security_level: SecurityLevel::default(),
            status: FunctionStatus::Registered,
            is_critical: false,
            auto_enable: true,
            emergency_wake_eligible: false,
            max_concurrency: None,
            created_at: SystemTime::UNIX_EPOCH,
            last_executed_at: None,
            sleep_since: None,
            wake_count: 0,
            execution_count: 0,
            failure_count: 0,
            average_duration_ms: 0.0,
            quality_score: 1.0,
        }
    }
}

impl FunctionRecord {
    /// Creates a record in the `REGISTERED` state with default metadata.
    pub fn new(id: impl Into<FunctionId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: SystemTime::now(),
            ..Default::default()
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the category.
    pub fn with_category(mut self, category: FunctionCategory) -> Self {
        self.category = category;
        self
    }

    /// Sets the security level.
    pub fn with_security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    /// Marks the function critical. Critical functions are emergency-wake
    /// eligible unless that is explicitly turned off afterwards.
    pub fn critical(mut self, is_critical: bool) -> Self {
        self.is_critical = is_critical;
        if is_critical {
            self.emergency_wake_eligible = true;
        }
        self
    }

    /// Sets whether registration enables the function immediately.
    pub fn auto_enable(mut self, auto_enable: bool) -> Self {
        self.auto_enable = auto_enable;
        self
    }

    /// Sets emergency-wake eligibility.
    pub fn emergency_wake_eligible(mut self, eligible: bool) -> Self {
        self.emergency_wake_eligible = eligible;
        self
    }

    /// Sets a per-function concurrency ceiling.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Checks the fields a registration requires.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidRecord {
            id: self.id.as_str().to_string(),
            reason: reason.to_string(),
        };
        if self.id.as_str().trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.id.as_str().chars().any(char::is_whitespace) {
            return Err(invalid("id must not contain whitespace"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.max_concurrency == Some(0) {
            return Err(invalid("max_concurrency must be at least 1"));
        }
        if self.failure_count > self.execution_count {
            return Err(invalid("failure_count exceeds execution_count"));
        }
        Ok(())
    }

    /// Checks a record read back from a snapshot. Metadata such as the name
    /// comes from the registrant at merge time, so only the id and the
    /// counters must hold together.
    pub fn validate_restored(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidRecord {
            id: self.id.as_str().to_string(),
            reason: reason.to_string(),
        };
        if self.id.as_str().trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.failure_count > self.execution_count {
            return Err(invalid("failure_count exceeds execution_count"));
        }
        Ok(())
    }

    /// Fraction of executions that failed, or 0.0 before the first execution.
    pub fn failure_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.execution_count as f64
        }
    }
}

/// Selection criteria for listing functions. Unset criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct FunctionFilter {
    /// Match only this status.
    pub status: Option<FunctionStatus>,
    /// Match only this category.
    pub category: Option<FunctionCategory>,
    /// Match only functions at or above this security level.
    pub min_security_level: Option<SecurityLevel>,
    /// Match only critical (or only non-critical) functions.
    pub critical: Option<bool>,
    /// Match only ids starting with this prefix.
    pub id_prefix: Option<String>,
}

impl FunctionFilter {
    /// A filter matching every function.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to one status.
    pub fn with_status(mut self, status: FunctionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to one category.
    pub fn with_category(mut self, category: FunctionCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Restricts to a minimum security level.
    pub fn with_min_security_level(mut self, level: SecurityLevel) -> Self {
        self.min_security_level = Some(level);
        self
    }

    /// Restricts by criticality.
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    /// Restricts to an id prefix.
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    /// Returns `true` if the record satisfies every set criterion.
    pub fn matches(&self, record: &FunctionRecord) -> bool {
        self.status.is_none_or(|s| record.status == s)
            && self.category.is_none_or(|c| record.category == c)
            && self
                .min_security_level
                .is_none_or(|l| record.security_level >= l)
            && self.critical.is_none_or(|c| record.is_critical == c)
            && self
                .id_prefix
                .as_deref()
                .is_none_or(|p| record.id.as_str().starts_with(p))
    }
}
