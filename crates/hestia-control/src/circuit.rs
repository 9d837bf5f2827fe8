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

//! Per-function circuit breaker.
//!
//! `CLOSED` counts consecutive failures and opens at the threshold. `OPEN`
//! rejects everything until the cooldown elapses, then lets exactly one trial
//! call through as `HALF_OPEN`. The trial's outcome closes or reopens it.

use hestia_core::{CircuitPhase, CircuitState, FunctionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Configuration for the [`CircuitBreaker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before allowing a trial.
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 60_000,
        }
    }
}

#[derive(Debug, Default)]
struct Breaker {
    phase: CircuitPhase,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Tracks one breaker per function id.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<FunctionId, Breaker>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Creates a breaker set with every circuit closed.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FunctionId, Breaker>> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configured cooldown.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.config.cooldown_ms)
    }

    /// Returns `true` if a call may be dispatched now.
    ///
    /// An open circuit whose cooldown elapsed moves to `HALF_OPEN` and the
    /// caller receiving `true` owns the single trial. It must report the
    /// outcome, or call [`abandon_trial`](Self::abandon_trial) if the call
    /// never dispatches.
    pub fn is_available(&self, id: &FunctionId) -> bool {
        let mut breakers = self.lock();
        let Some(breaker) = breakers.get_mut(id) else {
            return true;
        };
        match breaker.phase {
            CircuitPhase::Closed => true,
            CircuitPhase::Open => {
                let cooled = breaker
                    .opened_at
                    .is_none_or(|opened| opened.elapsed() >= self.cooldown());
                if cooled {
                    log::info!("Circuit for '{}' half-open, allowing one trial call.", id);
                    breaker.phase = CircuitPhase::HalfOpen;
                    breaker.trial_in_flight = true;
                }
                cooled
            }
            CircuitPhase::HalfOpen => {
                if breaker.trial_in_flight {
                    false
                } else {
                    breaker.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Releases a trial claimed by `is_available` that never dispatched.
    pub fn abandon_trial(&self, id: &FunctionId) {
        if let Some(breaker) = self.lock().get_mut(id) {
            if breaker.phase == CircuitPhase::HalfOpen {
                breaker.trial_in_flight = false;
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self, id: &FunctionId) {
        let mut breakers = self.lock();
        let Some(breaker) = breakers.get_mut(id) else {
            return;
        };
        if breaker.phase == CircuitPhase::HalfOpen {
            log::info!("Circuit for '{}' closed after successful trial.", id);
        }
        *breaker = Breaker::default();
    }

    /// Records a failed call. Timeouts and cancellations count as failures.
    pub fn record_failure(&self, id: &FunctionId) {
        let mut breakers = self.lock();
        let breaker = breakers.entry(id.clone()).or_default();
        match breaker.phase {
            CircuitPhase::Closed => {
                breaker.consecutive_failures += 1;
                if breaker.consecutive_failures >= self.config.failure_threshold {
                    log::warn!(
                        "Circuit for '{}' opened after {} consecutive failures.",
                        id,
                        breaker.consecutive_failures
                    );
                    breaker.phase = CircuitPhase::Open;
                    breaker.opened_at = Some(Instant::now());
                }
            }
            CircuitPhase::HalfOpen => {
                log::warn!("Circuit for '{}' trial failed, reopening.", id);
                breaker.consecutive_failures += 1;
                breaker.phase = CircuitPhase::Open;
                breaker.opened_at = Some(Instant::now());
                breaker.trial_in_flight = false;
            }
            // Late completions of calls dispatched before the circuit opened.
            CircuitPhase::Open => {
                breaker.consecutive_failures += 1;
            }
        }
    }

    /// Current state of the circuit for `id`.
    pub fn state(&self, id: &FunctionId) -> CircuitState {
        let breakers = self.lock();
        match breakers.get(id) {
            Some(b) => CircuitState {
                function_id: id.clone(),
                state: b.phase,
                failure_count: b.consecutive_failures,
                opened_at: b.opened_at,
                cooldown: self.cooldown(),
            },
            None => CircuitState::closed(id.clone(), self.cooldown()),
        }
    }

    /// Ids of every circuit that is not closed, sorted.
    pub fn open_circuits(&self) -> Vec<FunctionId> {
        let mut ids: Vec<_> = self
            .lock()
            .iter()
            .filter(|(_, b)| b.phase != CircuitPhase::Closed)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Forgets the circuit for `id`, closing it.
    pub fn reset(&self, id: &FunctionId) {
        if self.lock().remove(id).is_some() {
            log::debug!("Circuit for '{}' reset.", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown_ms,
        })
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(5, 60_000);
        let id = FunctionId::new("geocode");
        for _ in 0..4 {
            cb.record_failure(&id);
            assert!(cb.is_available(&id));
        }
        cb.record_failure(&id);
        assert!(!cb.is_available(&id));
        let state = cb.state(&id);
        assert_eq!(state.state, CircuitPhase::Open);
        assert_eq!(state.failure_count, 5);
        assert!(state.remaining_cooldown().is_some());
        assert_eq!(cb.open_circuits(), vec![id]);
    }

    #[test]
    fn test_success_resets_count() {
        let cb = breaker(3, 60_000);
        let id = FunctionId::new("a");
        cb.record_failure(&id);
        cb.record_failure(&id);
        cb.record_success(&id);
        cb.record_failure(&id);
        cb.record_failure(&id);
        assert!(cb.is_available(&id));
        assert_eq!(cb.state(&id).failure_count, 2);
    }

    #[test]
    fn test_single_trial_after_cooldown() {
        let cb = breaker(1, 10);
        let id = FunctionId::new("a");
        cb.record_failure(&id);
        assert!(!cb.is_available(&id));
        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.is_available(&id));
        assert_eq!(cb.state(&id).state, CircuitPhase::HalfOpen);
        assert!(!cb.is_available(&id));

        cb.record_success(&id);
        assert_eq!(cb.state(&id).state, CircuitPhase::Closed);
        assert!(cb.is_available(&id));
    }

    #[test]
    fn test_failed_trial_reopens() {
        let cb = breaker(1, 10);
        let id = FunctionId::new("a");
        cb.record_failure(&id);
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.is_available(&id));
        cb.record_failure(&id);
        assert_eq!(cb.state(&id).state, CircuitPhase::Open);
        assert!(!cb.is_available(&id));
    }

    #[test]
    fn test_abandoned_trial_is_released() {
        let cb = breaker(1, 10);
        let id = FunctionId::new("a");
        cb.record_failure(&id);
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.is_available(&id));
        cb.abandon_trial(&id);
        assert!(cb.is_available(&id));
    }

    #[test]
    fn test_reset_closes() {
        let cb = breaker(1, 60_000);
        let id = FunctionId::new("a");
        cb.record_failure(&id);
        cb.reset(&id);
        assert!(cb.is_available(&id));
        assert!(cb.open_circuits().is_empty());
    }
}
