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

//! Applies the bridge's intent signals to the hot path.

use crate::background::BackgroundTask;
use crate::executor::ExecutionCoordinator;
use crate::lifecycle::LifecycleController;
use crossbeam_channel::Receiver;
use hestia_core::telemetry::IntentSignal;
use hestia_core::RegistryError;
use std::sync::Arc;

/// Translates [`IntentSignal`]s into coordinator and lifecycle calls.
///
/// Signals are requests: each one is validated by the component it targets
/// and may be refused.
#[derive(Debug)]
pub struct SignalApplier {
    coordinator: Arc<ExecutionCoordinator>,
    lifecycle: Arc<LifecycleController>,
}

impl SignalApplier {
    pub fn new(
        coordinator: Arc<ExecutionCoordinator>,
        lifecycle: Arc<LifecycleController>,
    ) -> Self {
        Self {
            coordinator,
            lifecycle,
        }
    }

    /// Applies one signal.
    pub fn apply(&self, signal: &IntentSignal) -> Result<(), RegistryError> {
        match signal {
            IntentSignal::AdjustConcurrency { ceiling } => {
                let applied = self.coordinator.set_concurrency_ceiling(*ceiling);
                if applied != *ceiling {
                    log::debug!("Requested ceiling {} clamped to {}.", ceiling, applied);
                }
                Ok(())
            }
            IntentSignal::SleepPriority { candidates } => {
                self.lifecycle.apply_sleep_priorities(candidates);
                Ok(())
            }
            IntentSignal::EmergencyWake {
                function_id,
                reason,
            } => {
                log::warn!("Emergency wake of '{}': {}", function_id, reason);
                self.lifecycle.emergency_wake(function_id.as_str()).map(|_| ())
            }
        }
    }

    /// Applies every signal received on `signals` from a background thread.
    pub fn spawn(
        self: Arc<Self>,
        signals: Receiver<IntentSignal>,
    ) -> std::io::Result<BackgroundTask> {
        BackgroundTask::spawn("hestia-signals", move |stop| loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(signals) -> msg => match msg {
                    Ok(signal) => {
                        if let Err(err) = self.apply(&signal) {
                            log::warn!("Signal {:?} refused: {}", signal, err);
                        }
                    }
                    Err(_) => break,
                },
            }
        })
    }
}
