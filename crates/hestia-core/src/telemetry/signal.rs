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

//! Intent signals and alerts.
//!
//! The monitoring bridge never mutates the registry. It only emits intents
//! that the lifecycle controller and the execution coordinator validate and
//! apply under the registry's own synchronization.

use crate::function::FunctionId;
use std::fmt;
use std::time::SystemTime;

/// A suggestion emitted by the monitoring bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentSignal {
    /// Change the global concurrency ceiling.
    AdjustConcurrency {
        /// Suggested ceiling.
        ceiling: usize,
    },
    /// Functions that should be considered for sleep first, most idle first.
    SleepPriority {
        /// Candidates in priority order.
        candidates: Vec<FunctionId>,
    },
    /// Wake a critical function immediately through the emergency path.
    EmergencyWake {
        /// The function to wake.
        function_id: FunctionId,
        /// Why the bridge asked for it.
        reason: String,
    },
}

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Degraded but operating.
    Warning,
    /// A critical function failed or the system is under severe stress.
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
        })
    }
}

/// A condition that operators should know about.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Function involved, if any.
    pub function_id: Option<FunctionId>,
    /// Severity.
    pub severity: AlertSeverity,
    /// Description.
    pub message: String,
    /// When the alert was raised.
    pub raised_at: SystemTime,
}

impl Alert {
    /// An alert about one function.
    pub fn for_function(
        function_id: FunctionId,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            function_id: Some(function_id),
            severity,
            message: message.into(),
            raised_at: SystemTime::now(),
        }
    }

    /// A system-wide alert.
    pub fn system(severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            function_id: None,
            severity,
            message: message.into(),
            raised_at: SystemTime::now(),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function_id {
            Some(id) => write!(f, "[{}] {}: {}", self.severity, id, self.message),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}
