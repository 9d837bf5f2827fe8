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

//! Sleep and wake management.
//!
//! The controller decides when idle functions go to sleep and performs every
//! wake, whatever its origin. Capability hooks (`on_wake`, `on_sleep`) always
//! run outside the registry lock.

use crate::background::BackgroundTask;
use crate::registry::{FunctionRegistry, WakeTicket};
use crate::sink::{EventSink, SaveTrigger};
use crate::stats::StatisticsAggregator;
use hestia_core::telemetry::{Alert, AlertSeverity};
use hestia_core::{FunctionCategory, FunctionId, FunctionRecord, FunctionStatus, RegistryError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a function is being woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeReason {
    /// An execution request arrived for a sleeping function.
    Request,
    /// The function slept longer than the configured maximum.
    Scheduled,
    /// System stress requires a critical function to be available.
    Emergency,
    /// An operator asked for it.
    Administrative,
}

impl fmt::Display for WakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WakeReason::Request => "request",
            WakeReason::Scheduled => "scheduled",
            WakeReason::Emergency => "emergency",
            WakeReason::Administrative => "administrative",
        })
    }
}

/// Configuration for the [`LifecycleController`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How often the background evaluator runs.
    pub evaluation_interval_ms: u64,
    /// Idle time after which a function becomes a sleep candidate.
    pub idle_threshold_ms: u64,
    /// Per-category overrides of `idle_threshold_ms`.
    pub category_idle_threshold_ms: HashMap<FunctionCategory, u64>,
    /// How long a candidate stays awake before sleeping. A request during
    /// this window cancels the pending sleep.
    pub grace_period_ms: u64,
    /// When set, functions asleep this long are woken for a health check.
    pub max_sleep_ms: Option<u64>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_ms: 10_000,
            idle_threshold_ms: 300_000,
            category_idle_threshold_ms: HashMap::new(),
            grace_period_ms: 30_000,
            max_sleep_ms: None,
        }
    }
}

impl LifecycleConfig {
    /// Idle threshold applying to functions of `category`.
    pub fn idle_threshold_for(&self, category: FunctionCategory) -> Duration {
        let ms = self
            .category_idle_threshold_ms
            .get(&category)
            .copied()
            .unwrap_or(self.idle_threshold_ms);
        Duration::from_millis(ms)
    }
}

/// What one evaluation pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SleepEvaluation {
    /// Functions put to sleep.
    pub slept: Vec<FunctionId>,
    /// Candidates still inside their grace period.
    pub pending: Vec<FunctionId>,
    /// Functions woken because they reached the maximum sleep duration.
    pub woken: Vec<FunctionId>,
    /// Scheduled wakes that failed and left the function in `ERROR`.
    pub failed_wakes: Vec<FunctionId>,
}

/// Applies sleep and wake transitions.
pub struct LifecycleController {
    config: LifecycleConfig,
    registry: Arc<FunctionRegistry>,
    stats: Arc<StatisticsAggregator>,
    events: EventSink,
    save: SaveTrigger,
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    /// Creates a controller.
    pub fn new(
        config: LifecycleConfig,
        registry: Arc<FunctionRegistry>,
        stats: Arc<StatisticsAggregator>,
        events: EventSink,
        save: SaveTrigger,
    ) -> Self {
        Self {
            config,
            registry,
            stats,
            events,
            save,
        }
    }

    /// The configuration in force.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Runs one evaluation pass now.
    pub fn evaluate_sleep_candidates(&self) -> SleepEvaluation {
        self.evaluate_at(Instant::now())
    }

    /// Runs one evaluation pass as if the current time were `now`.
    pub fn evaluate_at(&self, now: Instant) -> SleepEvaluation {
        let sweep = self.registry.sweep_idle(
            now,
            |record| self.config.idle_threshold_for(record.category),
            Duration::from_millis(self.config.grace_period_ms),
            self.config.max_sleep_ms.map(Duration::from_millis),
        );

        let mut evaluation = SleepEvaluation {
            pending: sweep.pending,
            ..Default::default()
        };
        for (id, capability) in sweep.slept {
            capability.on_sleep();
            self.stats.record_sleep();
            log::info!("Function '{}' put to sleep after idling.", id);
            evaluation.slept.push(id);
        }
        for id in sweep.due_for_wake {
            match self.wake(id.as_str(), WakeReason::Scheduled) {
                Ok(_) => evaluation.woken.push(id),
                Err(_) => evaluation.failed_wakes.push(id),
            }
        }
        if !evaluation.slept.is_empty() || !evaluation.woken.is_empty() {
            log::debug!(
                "Lifecycle pass: {} slept, {} pending, {} woken.",
                evaluation.slept.len(),
                evaluation.pending.len(),
                evaluation.woken.len()
            );
        }
        evaluation
    }

    /// Wakes a sleeping function and runs its `on_wake` hook.
    ///
    /// Waking an awake function is a no-op. Concurrent wakes of the same
    /// function produce a single transition. A failing hook moves the
    /// function to `ERROR` and raises an alert.
    pub fn wake(&self, id: &str, reason: WakeReason) -> Result<FunctionRecord, RegistryError> {
        let ticket = self
            .registry
            .begin_wake(id, reason == WakeReason::Emergency)?;
        let (capability, is_critical) = match ticket {
            WakeTicket::AlreadyAwake(record) => return Ok(record),
            WakeTicket::Proceed {
                capability,
                is_critical,
            } => (capability, is_critical),
        };

        let outcome = capability.on_wake().map_err(|e| e.to_string());
        match self.registry.finish_wake(id, outcome) {
            Ok(record) => {
                self.stats.record_wake();
                log::info!("Function '{}' woken ({}).", id, reason);
                if reason == WakeReason::Emergency {
                    self.save.request(format!("emergency wake of {id}"));
                }
                Ok(record)
            }
            Err(err) => {
                if matches!(err, RegistryError::WakeFailed { .. }) {
                    let severity = if is_critical {
                        AlertSeverity::Critical
                    } else {
                        AlertSeverity::Warning
                    };
                    self.raise(Alert::for_function(
                        FunctionId::new(id),
                        severity,
                        err.to_string(),
                    ));
                    self.save.request(format!("{id} entered error state"));
                }
                Err(err)
            }
        }
    }

    /// Administrative wake.
    pub fn force_wake(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.wake(id, WakeReason::Administrative)
    }

    /// Emergency wake. Only functions marked eligible may be woken this way.
    pub fn emergency_wake(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.wake(id, WakeReason::Emergency)
    }

    /// Puts an idle `ACTIVE` function to sleep right away, critical or not.
    pub fn force_sleep(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        let (record, capability) = self.registry.sleep_now(id)?;
        capability.on_sleep();
        self.stats.record_sleep();
        log::info!("Function '{}' put to sleep by request.", id);
        Ok(record)
    }

    /// Disables a function. Idempotent.
    pub fn disable(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        let previous = self.registry.update_status(id, FunctionStatus::Disabled)?;
        if previous != FunctionStatus::Disabled {
            log::info!("Function '{}' disabled (was {}).", id, previous);
            self.save.request(format!("disable of {id}"));
        }
        self.registry.get(id)
    }

    /// Enables a `REGISTERED` function.
    pub fn enable(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.registry.update_status(id, FunctionStatus::Active)?;
        log::info!("Function '{}' enabled.", id);
        self.registry.get(id)
    }

    /// Returns a `DISABLED` or `ERROR` function to `REGISTERED`, then to
    /// `ACTIVE` if it auto-enables.
    pub fn reset(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        let previous = self.registry.update_status(id, FunctionStatus::Registered)?;
        let record = self.registry.get(id)?;
        if record.auto_enable {
            self.registry.update_status(id, FunctionStatus::Active)?;
        }
        log::info!("Function '{}' reset from {}.", id, previous);
        self.save.request(format!("reset of {id}"));
        self.registry.get(id)
    }

    /// Like [`reset`](Self::reset), but only from `ERROR`.
    pub fn reset_error(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        let record = self.registry.get(id)?;
        if record.status != FunctionStatus::Error {
            return Err(RegistryError::InvalidTransition {
                id: record.id,
                from: record.status,
                to: FunctionStatus::Registered,
            });
        }
        self.reset(id)
    }

    /// Halts a function after an unrecoverable fault.
    pub fn report_fault(&self, id: &str, reason: &str) -> Result<FunctionRecord, RegistryError> {
        let previous = self.registry.update_status(id, FunctionStatus::Error)?;
        let record = self.registry.get(id)?;
        if previous != FunctionStatus::Error {
            let severity = if record.is_critical {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            self.raise(Alert::for_function(
                record.id.clone(),
                severity,
                format!("halted: {reason}"),
            ));
            self.save.request(format!("{id} entered error state"));
        }
        Ok(record)
    }

    /// Marks or unmarks a function as critical.
    pub fn set_critical(&self, id: &str, critical: bool) -> Result<FunctionRecord, RegistryError> {
        let record = self.registry.set_critical(id, critical)?;
        self.save.request(format!("criticality change of {id}"));
        Ok(record)
    }

    /// Starts the grace period now for the given candidates.
    pub fn apply_sleep_priorities(&self, candidates: &[FunctionId]) -> usize {
        let applied = self.registry.prioritize_sleep(candidates);
        if applied > 0 {
            log::debug!("{} function(s) prioritized for sleep.", applied);
        }
        applied
    }

    /// Raises an alert and counts it.
    pub fn raise(&self, alert: Alert) {
        self.stats.record_alert();
        self.events.alert(alert);
    }

    /// Runs [`evaluate_sleep_candidates`](Self::evaluate_sleep_candidates)
    /// every `evaluation_interval_ms` on a background thread.
    pub fn spawn_evaluator(self: &Arc<Self>) -> std::io::Result<BackgroundTask> {
        let controller = Arc::clone(self);
        BackgroundTask::periodic(
            "hestia-lifecycle",
            Duration::from_millis(self.config.evaluation_interval_ms),
            move || {
                controller.evaluate_sleep_candidates();
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatisticsConfig;
    use hestia_core::telemetry::TelemetryEvent;
    use hestia_core::{CancellationToken, Capability, CapabilityError, Payload};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Hooked {
        wakes: AtomicUsize,
        sleeps: AtomicUsize,
        fail_wake: bool,
    }

    impl Capability for Hooked {
        fn invoke(&self, _: &Payload, _: &CancellationToken) -> Result<Payload, CapabilityError> {
            Ok(Payload::Null)
        }
        fn on_wake(&self) -> Result<(), CapabilityError> {
            self.wakes.fetch_add(1, Ordering::SeqCst);
            if self.fail_wake {
                Err(CapabilityError::failed("backend unreachable"))
            } else {
                Ok(())
            }
        }
        fn on_sleep(&self) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        registry: Arc<FunctionRegistry>,
        stats: Arc<StatisticsAggregator>,
        lifecycle: LifecycleController,
        events: crossbeam_channel::Receiver<TelemetryEvent>,
        saves: crossbeam_channel::Receiver<crate::sink::SaveRequest>,
    }

    fn fixture(config: LifecycleConfig) -> Fixture {
        let registry = Arc::new(FunctionRegistry::default());
        let stats = Arc::new(StatisticsAggregator::new(
            StatisticsConfig::default(),
            Arc::clone(&registry),
        ));
        let (tx, events) = crossbeam_channel::bounded(16);
        let (save, saves) = SaveTrigger::channel();
        let lifecycle = LifecycleController::new(
            config,
            Arc::clone(&registry),
            Arc::clone(&stats),
            EventSink::new(tx),
            save,
        );
        Fixture {
            registry,
            stats,
            lifecycle,
            events,
            saves,
        }
    }

    #[test]
    fn test_category_thresholds() {
        let mut config = LifecycleConfig::default();
        config
            .category_idle_threshold_ms
            .insert(FunctionCategory::Monitoring, 1_000);
        assert_eq!(
            config.idle_threshold_for(FunctionCategory::Monitoring),
            Duration::from_secs(1)
        );
        assert_eq!(
            config.idle_threshold_for(FunctionCategory::Integration),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_idle_function_sleeps_and_wakes_on_demand() {
        let f = fixture(LifecycleConfig {
            idle_threshold_ms: 1_000,
            grace_period_ms: 0,
            ..Default::default()
        });
        let hooks = Arc::new(Hooked::default());
        f.registry
            .register(FunctionRecord::new("a", "A"), hooks.clone())
            .unwrap();

        let evaluation = f.lifecycle.evaluate_at(Instant::now() + Duration::from_secs(2));
        assert_eq!(evaluation.slept, vec![FunctionId::new("a")]);
        assert_eq!(hooks.sleeps.load(Ordering::SeqCst), 1);

        let record = f.lifecycle.wake("a", WakeReason::Request).unwrap();
        assert_eq!(record.status, FunctionStatus::Active);
        assert_eq!(record.wake_count, 1);
        assert_eq!(hooks.wakes.load(Ordering::SeqCst), 1);
        assert_eq!(f.stats.counters().total_sleeps, 1);
        assert_eq!(f.stats.counters().total_wakes, 1);

        // Waking an awake function changes nothing.
        let again = f.lifecycle.wake("a", WakeReason::Request).unwrap();
        assert_eq!(again.wake_count, 1);
    }

    #[test]
    fn test_critical_function_never_auto_sleeps() {
        let f = fixture(LifecycleConfig {
            idle_threshold_ms: 0,
            grace_period_ms: 0,
            ..Default::default()
        });
        f.registry
            .register(
                FunctionRecord::new("auth", "Auth").critical(true),
                Arc::new(Hooked::default()),
            )
            .unwrap();
        let evaluation = f.lifecycle.evaluate_at(Instant::now() + Duration::from_secs(3600));
        assert!(evaluation.slept.is_empty());
        assert_eq!(f.registry.get("auth").unwrap().status, FunctionStatus::Active);
    }

    #[test]
    fn test_failed_wake_raises_alert() {
        let f = fixture(LifecycleConfig::default());
        f.registry
            .register(
                FunctionRecord::new("a", "A").critical(true),
                Arc::new(Hooked {
                    fail_wake: true,
                    ..Default::default()
                }),
            )
            .unwrap();
        f.lifecycle.force_sleep("a").unwrap();

        let err = f.lifecycle.wake("a", WakeReason::Administrative).unwrap_err();
        assert!(matches!(err, RegistryError::WakeFailed { .. }));
        assert_eq!(f.registry.get("a").unwrap().status, FunctionStatus::Error);
        match f.events.try_recv() {
            Ok(TelemetryEvent::Alert(alert)) => assert_eq!(alert.severity, AlertSeverity::Critical),
            other => panic!("expected an alert, got {:?}", other),
        }
        assert_eq!(f.stats.counters().total_alerts, 1);
        assert!(f.saves.try_recv().is_ok());

        let record = f.lifecycle.reset_error("a").unwrap();
        assert_eq!(record.status, FunctionStatus::Active);
    }

    #[test]
    fn test_emergency_wake_requires_eligibility() {
        let f = fixture(LifecycleConfig::default());
        f.registry
            .register(FunctionRecord::new("plain", "Plain"), Arc::new(Hooked::default()))
            .unwrap();
        f.registry
            .register(
                FunctionRecord::new("vital", "Vital").critical(true),
                Arc::new(Hooked::default()),
            )
            .unwrap();
        f.lifecycle.force_sleep("plain").unwrap();
        f.lifecycle.force_sleep("vital").unwrap();

        assert!(matches!(
            f.lifecycle.emergency_wake("plain"),
            Err(RegistryError::NotEmergencyEligible(_))
        ));
        assert_eq!(
            f.lifecycle.emergency_wake("vital").unwrap().status,
            FunctionStatus::Active
        );
        assert_eq!(
            f.saves.try_recv().map(|r| r.reason),
            Ok("emergency wake of vital".to_string())
        );
    }

    #[test]
    fn test_disable_is_idempotent_and_persisted() {
        let f = fixture(LifecycleConfig::default());
        f.registry
            .register(FunctionRecord::new("a", "A"), Arc::new(Hooked::default()))
            .unwrap();
        assert_eq!(f.lifecycle.disable("a").unwrap().status, FunctionStatus::Disabled);
        assert!(f.saves.try_recv().is_ok());
        assert_eq!(f.lifecycle.disable("a").unwrap().status, FunctionStatus::Disabled);
        assert!(f.saves.try_recv().is_err());

        assert!(matches!(
            f.lifecycle.reset_error("a"),
            Err(RegistryError::InvalidTransition { .. })
        ));
        assert_eq!(f.lifecycle.reset("a").unwrap().status, FunctionStatus::Active);
    }

    #[test]
    fn test_scheduled_wake_after_max_sleep() {
        let f = fixture(LifecycleConfig {
            idle_threshold_ms: u64::MAX,
            max_sleep_ms: Some(1_000),
            ..Default::default()
        });
        f.registry
            .register(FunctionRecord::new("a", "A"), Arc::new(Hooked::default()))
            .unwrap();
        f.lifecycle.force_sleep("a").unwrap();
        let evaluation = f.lifecycle.evaluate_at(Instant::now() + Duration::from_secs(2));
        assert_eq!(evaluation.woken, vec![FunctionId::new("a")]);
        assert_eq!(f.registry.get("a").unwrap().status, FunctionStatus::Active);
    }

    #[test]
    fn test_sleep_priorities_start_grace_period() {
        let f = fixture(LifecycleConfig {
            idle_threshold_ms: u64::MAX,
            grace_period_ms: 1_000,
            ..Default::default()
        });
        f.registry
            .register(FunctionRecord::new("a", "A"), Arc::new(Hooked::default()))
            .unwrap();
        assert_eq!(f.lifecycle.apply_sleep_priorities(&[FunctionId::new("a")]), 1);
        let evaluation = f.lifecycle.evaluate_at(Instant::now() + Duration::from_secs(2));
        assert_eq!(evaluation.slept, vec![FunctionId::new("a")]);
    }
}
