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

//! Circuit breaker state types.

use crate::function::FunctionId;
use std::fmt;
use std::time::{Duration, Instant};

/// Dispatch gate position of a function's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CircuitPhase {
    /// Calls flow normally.
    #[default]
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// One trial call decides whether to close or re-open.
    HalfOpen,
}

impl fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitPhase::Closed => "closed",
            CircuitPhase::Open => "open",
            CircuitPhase::HalfOpen => "half_open",
        })
    }
}

/// A point-in-time view of one function's breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitState {
    /// The guarded function.
    pub function_id: FunctionId,
    /// Current phase.
    pub state: CircuitPhase,
    /// Consecutive failures observed while closed.
    pub failure_count: u32,
    /// When the breaker last opened.
    pub opened_at: Option<Instant>,
    /// How long the breaker stays open before allowing a trial.
    pub cooldown: Duration,
}

impl CircuitState {
    /// A closed breaker for `function_id`.
    pub fn closed(function_id: FunctionId, cooldown: Duration) -> Self {
        Self {
            function_id,
            state: CircuitPhase::Closed,
            failure_count: 0,
            opened_at: None,
            cooldown,
        }
    }

    /// Time left before an open breaker admits a trial, if open.
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        match (self.state, self.opened_at) {
            (CircuitPhase::Open, Some(opened)) => {
                Some(self.cooldown.saturating_sub(opened.elapsed()))
            }
            _ => None,
        }
    }
}
