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

//! The function lifecycle state machine.
//!
//! ```text
//!  REGISTERED ──enable──▶ ACTIVE ◀──execution end── RUNNING
//!      ▲                   │  ▲ ───execution start──▶
//!      │                   │  │
//!    reset            sleep│  │wake
//!      │                   ▼  │
//!  DISABLED / ERROR ◀──── SLEEPING
//! ```
//!
//! Any state may move to `DISABLED` (administrative) or `ERROR`
//! (unrecoverable fault). Both are terminal until an explicit reset returns
//! the function to `REGISTERED`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Activation state of a registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionStatus {
    /// Known to the registry but not yet enabled.
    #[default]
    Registered,
    /// Enabled and idle, ready to accept invocations.
    Active,
    /// At least one invocation is in flight.
    Running,
    /// Deactivated to conserve resources; woken on demand.
    Sleeping,
    /// Administratively disabled.
    Disabled,
    /// Halted after an unrecoverable fault.
    Error,
}

impl FunctionStatus {
    /// Returns `true` if the state machine allows moving from `self` to `to`.
    ///
    /// `DISABLED → DISABLED` and `ERROR → ERROR` are accepted so that
    /// repeated administrative calls and repeated fault reports are idempotent.
    pub fn can_transition_to(self, to: FunctionStatus) -> bool {
        use FunctionStatus::*;
        match (self, to) {
            (_, Disabled) | (_, Error) => true,
            (Registered, Active) => true,
            (Active, Running) | (Running, Active) => true,
            (Active, Sleeping) | (Sleeping, Active) => true,
            (Disabled, Registered) | (Error, Registered) => true,
            _ => false,
        }
    }

    /// Returns `true` for states that only an explicit reset can leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, FunctionStatus::Disabled | FunctionStatus::Error)
    }

    /// Returns `true` if the function can accept a dispatch without waking.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, FunctionStatus::Active | FunctionStatus::Running)
    }

    /// Lowercase name used in logs and the persisted document.
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionStatus::Registered => "registered",
            FunctionStatus::Active => "active",
            FunctionStatus::Running => "running",
            FunctionStatus::Sleeping => "sleeping",
            FunctionStatus::Disabled => "disabled",
            FunctionStatus::Error => "error",
        }
    }
}

impl fmt::Display for FunctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::FunctionStatus::*;
    use super::*;

    const ALL: [FunctionStatus; 6] = [Registered, Active, Running, Sleeping, Disabled, Error];

    #[test]
    fn test_every_state_can_be_disabled_or_errored() {
        for state in ALL {
            assert!(state.can_transition_to(Disabled), "{state} -> disabled");
            assert!(state.can_transition_to(Error), "{state} -> error");
        }
    }

    #[test]
    fn test_execution_round_trip_allowed() {
        assert!(Active.can_transition_to(Running));
        assert!(Running.can_transition_to(Active));
    }

    #[test]
    fn test_running_cannot_sleep_directly() {
        assert!(!Running.can_transition_to(Sleeping));
        assert!(!Sleeping.can_transition_to(Running));
    }

    #[test]
    fn test_terminal_states_only_reset_to_registered() {
        for terminal in [Disabled, Error] {
            assert!(terminal.is_terminal());
            assert!(terminal.can_transition_to(Registered));
            assert!(!terminal.can_transition_to(Active));
            assert!(!terminal.can_transition_to(Sleeping));
        }
    }

    #[test]
    fn test_registered_only_enables() {
        assert!(Registered.can_transition_to(Active));
        assert!(!Registered.can_transition_to(Running));
        assert!(!Registered.can_transition_to(Sleeping));
        assert!(!Active.can_transition_to(Registered));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&Sleeping).unwrap();
        assert_eq!(json, "\"sleeping\"");
        let back: FunctionStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, Error);
    }
}
