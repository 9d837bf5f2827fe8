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

//! The global concurrency ceiling.

use hestia_core::CancellationToken;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Longest a queued caller sleeps before looking at its cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// What happens to a request arriving while the ceiling is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject immediately with `Overloaded`.
    #[default]
    FailFast,
    /// Wait for a slot, up to `max_waiting` queued callers for at most
    /// `max_wait_ms` each, then reject.
    Queue {
        /// Callers allowed to wait at once.
        max_waiting: usize,
        /// Longest a caller waits for a slot.
        max_wait_ms: u64,
    },
}

/// Why a slot was not granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRefused {
    /// The ceiling was reached and the overflow policy gave up.
    Full {
        /// Ceiling in force when the request was refused.
        ceiling: usize,
    },
    /// The caller cancelled while queued.
    Cancelled,
}

#[derive(Debug)]
struct GateState {
    ceiling: usize,
    running: usize,
    waiting: usize,
}

/// Counts running executions against a ceiling adjustable at runtime.
#[derive(Debug)]
pub struct ConcurrencyGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl ConcurrencyGate {
    /// Creates a gate. A ceiling of zero is raised to one.
    pub fn new(ceiling: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState {
                ceiling: ceiling.max(1),
                running: 0,
                waiting: 0,
            }),
            released: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes a slot under `policy`. A queued caller gives up as soon as
    /// `cancel` fires.
    pub fn acquire(
        self: &Arc<Self>,
        policy: OverflowPolicy,
        cancel: &CancellationToken,
    ) -> Result<SlotGuard, SlotRefused> {
        let mut state = self.lock();
        if state.running < state.ceiling {
            state.running += 1;
            return Ok(SlotGuard::new(self));
        }
        let full = |state: &GateState| SlotRefused::Full {
            ceiling: state.ceiling,
        };
        let OverflowPolicy::Queue {
            max_waiting,
            max_wait_ms,
        } = policy
        else {
            return Err(full(&state));
        };
        if state.waiting >= max_waiting {
            return Err(full(&state));
        }

        state.waiting += 1;
        let deadline = Instant::now() + Duration::from_millis(max_wait_ms);
        loop {
            if cancel.is_cancelled() {
                state.waiting -= 1;
                return Err(SlotRefused::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                state.waiting -= 1;
                return Err(full(&state));
            }
            let (guard, _) = self
                .released
                .wait_timeout(state, (deadline - now).min(CANCEL_POLL))
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if state.running < state.ceiling {
                state.waiting -= 1;
                state.running += 1;
                return Ok(SlotGuard::new(self));
            }
        }
    }

    /// Takes a slot without honoring the ceiling.
    pub fn acquire_bypass(self: &Arc<Self>) -> SlotGuard {
        self.lock().running += 1;
        SlotGuard::new(self)
    }

    /// Changes the ceiling and returns the previous one. Running executions
    /// are never interrupted; a lower ceiling takes effect as they finish.
    pub fn set_ceiling(&self, ceiling: usize) -> usize {
        let mut state = self.lock();
        let previous = state.ceiling;
        state.ceiling = ceiling.max(1);
        drop(state);
        self.released.notify_all();
        previous
    }

    /// The ceiling in force.
    pub fn ceiling(&self) -> usize {
        self.lock().ceiling
    }

    /// Slots currently held.
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Callers currently queued for a slot.
    pub fn waiting(&self) -> usize {
        self.lock().waiting
    }

    fn release(&self) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        drop(state);
        self.released.notify_one();
    }
}

/// A held slot, released on drop.
#[derive(Debug)]
pub struct SlotGuard {
    gate: Arc<ConcurrencyGate>,
}

impl SlotGuard {
    fn new(gate: &Arc<ConcurrencyGate>) -> Self {
        Self {
            gate: Arc::clone(gate),
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.gate.release();
    }
}
