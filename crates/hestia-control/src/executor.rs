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

//! Execution coordination.
//!
//! An invocation passes, in order: status checks (waking a sleeping function
//! on demand), the circuit breaker, the global concurrency gate and the
//! per-function limit. It then runs on its own worker thread while the
//! caller waits for the result, its deadline or a cancellation. Statistics
//! and the circuit breaker see every dispatched invocation exactly once.

use crate::circuit::CircuitBreaker;
use crate::gate::{ConcurrencyGate, OverflowPolicy, SlotRefused};
use crate::lifecycle::{LifecycleController, WakeReason};
use crate::registry::{Admission, FunctionRegistry};
use crate::sink::EventSink;
use crate::stats::StatisticsAggregator;
use hestia_core::telemetry::{Alert, AlertSeverity, RejectionReason, TelemetryEvent};
use hestia_core::{
    CancellationToken, Capability, CapabilityError, ErrorKind, ExecutionError, ExecutionRequest,
    ExecutionResult, FunctionId, FunctionStatus, Payload, RegistryError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// A function that falls back asleep between wake and admission this many
/// times in a row is reported as a failed wake.
const MAX_ADMISSION_ATTEMPTS: usize = 3;

/// Bounded exponential backoff for transient failures.
///
/// Only idempotent implementations are retried. Disabled by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub base_backoff_ms: u64,
    /// Upper bound on a single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(
            self.base_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

/// Configuration for the [`ExecutionCoordinator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Initial global concurrency ceiling.
    pub max_concurrent: usize,
    /// Lowest ceiling a runtime adjustment may set.
    pub min_concurrent: usize,
    /// Highest ceiling a runtime adjustment may set.
    pub max_concurrent_limit: usize,
    /// Default per-function limit for records that do not set one.
    pub per_function_limit: Option<usize>,
    /// Behavior when the ceiling is reached.
    pub overflow: OverflowPolicy,
    /// Timeout applied when the caller does not give one.
    pub default_timeout_ms: u64,
    /// Retry behavior for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            min_concurrent: 1,
            max_concurrent_limit: 64,
            per_function_limit: None,
            overflow: OverflowPolicy::FailFast,
            default_timeout_ms: 30_000,
            retry: RetryPolicy::default(),
        }
    }
}

fn ceiling_bounds(config: &ExecutionConfig) -> (usize, usize) {
    let low = config.min_concurrent.max(1);
    (low, config.max_concurrent_limit.max(low))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Emergency,
}

/// Runs invocations under status, circuit and concurrency constraints.
pub struct ExecutionCoordinator {
    config: ExecutionConfig,
    registry: Arc<FunctionRegistry>,
    breaker: Arc<CircuitBreaker>,
    lifecycle: Arc<LifecycleController>,
    stats: Arc<StatisticsAggregator>,
    gate: Arc<ConcurrencyGate>,
    events: EventSink,
    // Statistics, breaker and completion events observe the same order.
    completions: Mutex<()>,
}

impl fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl ExecutionCoordinator {
    /// Creates a coordinator.
    pub fn new(
        config: ExecutionConfig,
        registry: Arc<FunctionRegistry>,
        breaker: Arc<CircuitBreaker>,
        lifecycle: Arc<LifecycleController>,
        stats: Arc<StatisticsAggregator>,
        events: EventSink,
    ) -> Self {
        let (low, high) = ceiling_bounds(&config);
        let ceiling = config.max_concurrent.clamp(low, high);
        Self {
            gate: ConcurrencyGate::new(ceiling),
            config,
            registry,
            breaker,
            lifecycle,
            stats,
            events,
            completions: Mutex::new(()),
        }
    }

    /// Timeout used by [`execute_default`](Self::execute_default).
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.config.default_timeout_ms)
    }

    /// Invokes a function and waits for its result.
    ///
    /// Returns the successful result, or the error that prevented or ended
    /// the invocation. Failed invocations still update statistics.
    pub fn execute(
        &self,
        id: &str,
        args: Payload,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.execute_request(
            &ExecutionRequest::new(id, args, timeout),
            &CancellationToken::new(),
        )
    }

    /// Invokes a function with the default timeout.
    pub fn execute_default(
        &self,
        id: &str,
        args: Payload,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.execute(id, args, self.default_timeout())
    }

    /// Invokes a function, giving up early when `cancel` fires.
    pub fn execute_request(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.run(request, cancel, Mode::Normal)
    }

    /// Invokes an emergency-eligible function, waking it with emergency
    /// priority and bypassing the global concurrency ceiling. The circuit
    /// breaker and per-function limit still apply.
    pub fn execute_emergency(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.run(request, cancel, Mode::Emergency)
    }

    /// Sets the global ceiling, clamped to the configured bounds, and
    /// returns the value applied.
    pub fn set_concurrency_ceiling(&self, ceiling: usize) -> usize {
        let (low, high) = ceiling_bounds(&self.config);
        let applied = ceiling.clamp(low, high);
        let previous = self.gate.set_ceiling(applied);
        if previous != applied {
            log::info!("Concurrency ceiling {} -> {}.", previous, applied);
        }
        applied
    }

    /// The ceiling in force.
    pub fn concurrency_ceiling(&self) -> usize {
        self.gate.ceiling()
    }

    /// Invocations currently holding a slot.
    pub fn running(&self) -> usize {
        self.gate.running()
    }

    /// Lowest and highest ceiling the coordinator accepts.
    pub fn ceiling_bounds(&self) -> (usize, usize) {
        ceiling_bounds(&self.config)
    }

    fn run(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
        mode: Mode,
    ) -> Result<ExecutionResult, ExecutionError> {
        let id = &request.function_id;
        let mut attempt = 0;
        loop {
            match self.attempt(request, cancel, mode) {
                Err(err) if self.should_retry(id, &err, attempt) => {
                    let backoff = self.config.retry.backoff(attempt);
                    log::debug!("Retrying '{}' in {:?} after: {}", id, backoff, err);
                    if cancel.wait_timeout(backoff) {
                        return Err(ExecutionError::Cancelled(id.clone()));
                    }
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    fn should_retry(&self, id: &FunctionId, err: &ExecutionError, attempt: u32) -> bool {
        attempt < self.config.retry.max_retries
            && err.is_transient()
            && self
                .registry
                .capability(id.as_str())
                .is_ok_and(|c| c.is_idempotent())
    }

    fn attempt(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
        mode: Mode,
    ) -> Result<ExecutionResult, ExecutionError> {
        let id = &request.function_id;
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled(id.clone()));
        }
        let reason = match mode {
            Mode::Normal => WakeReason::Request,
            Mode::Emergency => WakeReason::Emergency,
        };

        self.ensure_awake(id, reason)?;

        if !self.breaker.is_available(id) {
            self.reject(id, RejectionReason::CircuitOpen);
            return Err(ExecutionError::CircuitOpen(id.clone()));
        }

        let slot = match mode {
            Mode::Normal => match self.gate.acquire(self.config.overflow, cancel) {
                Ok(slot) => slot,
                Err(SlotRefused::Full { ceiling }) => {
                    self.breaker.abandon_trial(id);
                    self.reject(id, RejectionReason::Overloaded);
                    return Err(ExecutionError::Overloaded {
                        id: id.clone(),
                        limit: ceiling,
                    });
                }
                Err(SlotRefused::Cancelled) => {
                    self.breaker.abandon_trial(id);
                    return Err(ExecutionError::Cancelled(id.clone()));
                }
            },
            Mode::Emergency => self.gate.acquire_bypass(),
        };

        let (capability, is_critical) = match self.admit(id, reason) {
            Ok(admitted) => admitted,
            Err(err) => {
                self.breaker.abandon_trial(id);
                if matches!(err, ExecutionError::Overloaded { .. }) {
                    self.reject(id, RejectionReason::Overloaded);
                }
                return Err(err);
            }
        };

        let started = Instant::now();
        let outcome = self.dispatch(id, capability, &request.arguments, request.timeout, cancel);
        let elapsed = started.elapsed();
        self.registry.end_execution(id.as_str());
        drop(slot);

        self.complete(id, outcome, elapsed, is_critical)
    }

    /// Rejects functions that cannot run and wakes sleeping ones.
    fn ensure_awake(&self, id: &FunctionId, reason: WakeReason) -> Result<(), ExecutionError> {
        let record = self
            .registry
            .get(id.as_str())
            .map_err(|_| ExecutionError::NotFound(id.clone()))?;
        if reason == WakeReason::Emergency && !record.emergency_wake_eligible {
            return Err(RegistryError::NotEmergencyEligible(id.clone()).into());
        }
        match record.status {
            FunctionStatus::Registered => Err(ExecutionError::NotEnabled(id.clone())),
            FunctionStatus::Disabled => Err(ExecutionError::Disabled(id.clone())),
            FunctionStatus::Error => Err(ExecutionError::ErrorState(id.clone())),
            FunctionStatus::Sleeping => self.wake(id, reason),
            FunctionStatus::Active | FunctionStatus::Running => Ok(()),
        }
    }

    fn wake(&self, id: &FunctionId, reason: WakeReason) -> Result<(), ExecutionError> {
        self.lifecycle
            .wake(id.as_str(), reason)
            .map(|_| ())
            .map_err(|err| match err {
                RegistryError::WakeFailed { id, reason } => {
                    ExecutionError::WakeFailed { id, reason }
                }
                RegistryError::NotFound(id) => ExecutionError::NotFound(id),
                RegistryError::InvalidTransition {
                    id,
                    from: FunctionStatus::Disabled,
                    ..
                } => ExecutionError::Disabled(id),
                RegistryError::InvalidTransition {
                    id,
                    from: FunctionStatus::Error,
                    ..
                } => ExecutionError::ErrorState(id),
                other => ExecutionError::Registry(other),
            })
    }

    fn admit(
        &self,
        id: &FunctionId,
        reason: WakeReason,
    ) -> Result<(Arc<dyn Capability>, bool), ExecutionError> {
        for _ in 0..MAX_ADMISSION_ATTEMPTS {
            match self
                .registry
                .begin_execution(id.as_str(), self.config.per_function_limit)?
            {
                Admission::Ready {
                    capability,
                    is_critical,
                } => return Ok((capability, is_critical)),
                Admission::Asleep => self.wake(id, reason)?,
            }
        }
        Err(ExecutionError::WakeFailed {
            id: id.clone(),
            reason: "function kept returning to sleep before dispatch".into(),
        })
    }

    /// Runs the implementation on a worker thread and waits for whichever
    /// comes first: its result, the caller's cancellation or the deadline.
    /// A worker that outlives its deadline is told to stop and abandoned.
    fn dispatch(
        &self,
        id: &FunctionId,
        capability: Arc<dyn Capability>,
        args: &Payload,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Payload, ExecutionError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let args = args.clone();

        thread::Builder::new()
            .name(format!("hestia-exec-{id}"))
            .spawn(move || {
                let _ = tx.send(capability.invoke(&args, &worker_token));
            })
            .map_err(|e| ExecutionError::ExecutionFailed {
                id: id.clone(),
                source: CapabilityError::failed(format!("failed to spawn worker: {e}")),
            })?;

        crossbeam_channel::select! {
            recv(rx) -> msg => match msg {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(CapabilityError::Cancelled)) if cancel.is_cancelled() => {
                    Err(ExecutionError::Cancelled(id.clone()))
                }
                Ok(Err(source)) => Err(ExecutionError::ExecutionFailed {
                    id: id.clone(),
                    source,
                }),
                Err(_) => Err(ExecutionError::ExecutionFailed {
                    id: id.clone(),
                    source: CapabilityError::failed("implementation panicked"),
                }),
            },
            recv(cancel.signal()) -> _ => {
                token.cancel();
                Err(ExecutionError::Cancelled(id.clone()))
            },
            default(timeout) => {
                token.cancel();
                log::warn!(
                    "Function '{}' timed out after {:?}, abandoning its worker.",
                    id,
                    timeout
                );
                Err(ExecutionError::TimedOut {
                    id: id.clone(),
                    timeout,
                })
            },
        }
    }

    fn complete(
        &self,
        id: &FunctionId,
        outcome: Result<Payload, ExecutionError>,
        elapsed: Duration,
        is_critical: bool,
    ) -> Result<ExecutionResult, ExecutionError> {
        let (result, error) = match outcome {
            Ok(output) => (ExecutionResult::succeeded(id.clone(), output, elapsed), None),
            Err(err) => {
                let kind = err.kind().unwrap_or(ErrorKind::ExecutionFailed);
                (ExecutionResult::failed(id.clone(), kind, elapsed), Some(err))
            }
        };

        {
            let _ordered = self
                .completions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.stats.record(&result);
            if result.success {
                self.breaker.record_success(id);
            } else {
                self.breaker.record_failure(id);
            }
            self.events.emit(TelemetryEvent::ExecutionCompleted {
                function_id: id.clone(),
                success: result.success,
                error_kind: result.error_kind,
                duration: elapsed,
            });
        }

        match error {
            None => Ok(result),
            Some(err) => {
                log::debug!("Execution of '{}' failed: {}", id, err);
                if is_critical {
                    self.lifecycle.raise(Alert::for_function(
                        id.clone(),
                        AlertSeverity::Critical,
                        format!("critical function failed: {err}"),
                    ));
                }
                Err(err)
            }
        }
    }

    fn reject(&self, id: &FunctionId, reason: RejectionReason) {
        log::debug!("Request for '{}' rejected: {:?}", id, reason);
        self.stats.record_rejection();
        self.events.emit(TelemetryEvent::Rejected {
            function_id: id.clone(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitBreakerConfig;
    use crate::lifecycle::LifecycleConfig;
    use crate::sink::SaveTrigger;
    use crate::stats::StatisticsConfig;
    use hestia_core::{FnCapability, FunctionFilter, FunctionRecord};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    struct Harness {
        registry: Arc<FunctionRegistry>,
        breaker: Arc<CircuitBreaker>,
        stats: Arc<StatisticsAggregator>,
        lifecycle: Arc<LifecycleController>,
        coordinator: Arc<ExecutionCoordinator>,
        events: crossbeam_channel::Receiver<TelemetryEvent>,
    }

    fn harness(config: ExecutionConfig) -> Harness {
        let registry = Arc::new(FunctionRegistry::default());
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            cooldown_ms: 60_000,
        }));
        let stats = Arc::new(StatisticsAggregator::new(
            StatisticsConfig::default(),
            Arc::clone(&registry),
        ));
        let (tx, events) = crossbeam_channel::bounded(256);
        let sink = EventSink::new(tx);
        let lifecycle = Arc::new(LifecycleController::new(
            LifecycleConfig::default(),
            Arc::clone(&registry),
            Arc::clone(&stats),
            sink.clone(),
            SaveTrigger::disabled(),
        ));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            config,
            Arc::clone(&registry),
            Arc::clone(&breaker),
            Arc::clone(&lifecycle),
            Arc::clone(&stats),
            sink,
        ));
        Harness {
            registry,
            breaker,
            stats,
            lifecycle,
            coordinator,
            events,
        }
    }

    fn register<F>(h: &Harness, record: FunctionRecord, func: F)
    where
        F: Fn(&Payload, &CancellationToken) -> Result<Payload, CapabilityError>
            + Send
            + Sync
            + 'static,
    {
        h.registry
            .register(record, Arc::new(FnCapability::new(func)))
            .unwrap();
    }

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_successful_execution() {
        let h = harness(ExecutionConfig::default());
        register(&h, FunctionRecord::new("echo", "Echo"), |args, _| {
            Ok(json!({ "echo": args.clone() }))
        });

        let result = h.coordinator.execute("echo", json!(1), SECOND).unwrap();
        assert!(result.success);
        assert_eq!(result.output, Some(json!({ "echo": 1 })));

        let record = h.registry.get("echo").unwrap();
        assert_eq!(record.execution_count, 1);
        assert_eq!(record.status, FunctionStatus::Active);
        assert!(record.last_executed_at.is_some());
        assert!(matches!(
            h.events.try_recv(),
            Ok(TelemetryEvent::ExecutionCompleted { success: true, .. })
        ));
    }

    #[test]
    fn test_unknown_and_disabled_functions() {
        let h = harness(ExecutionConfig::default());
        assert_eq!(
            h.coordinator.execute("ghost", Payload::Null, SECOND),
            Err(ExecutionError::NotFound(FunctionId::new("ghost")))
        );
        register(&h, FunctionRecord::new("a", "A"), |_, _| Ok(Payload::Null));
        h.lifecycle.disable("a").unwrap();
        assert_eq!(
            h.coordinator.execute("a", Payload::Null, SECOND),
            Err(ExecutionError::Disabled(FunctionId::new("a")))
        );
        assert_eq!(h.registry.get("a").unwrap().execution_count, 0);

        register(&h, FunctionRecord::new("b", "B").auto_enable(false), |_, _| {
            Ok(Payload::Null)
        });
        assert_eq!(
            h.coordinator.execute("b", Payload::Null, SECOND),
            Err(ExecutionError::NotEnabled(FunctionId::new("b")))
        );
    }

    #[test]
    fn test_failure_is_counted() {
        let h = harness(ExecutionConfig::default());
        register(&h, FunctionRecord::new("a", "A"), |_, _| {
            Err(CapabilityError::failed("upstream 503"))
        });
        let err = h.coordinator.execute("a", Payload::Null, SECOND).unwrap_err();
        assert!(matches!(err, ExecutionError::ExecutionFailed { .. }));
        let record = h.registry.get("a").unwrap();
        assert_eq!((record.execution_count, record.failure_count), (1, 1));
        assert_eq!(h.breaker.state(&FunctionId::new("a")).failure_count, 1);
    }

    #[test]
    fn test_timeout_abandons_worker() {
        let h = harness(ExecutionConfig::default());
        register(&h, FunctionRecord::new("slow", "Slow"), |_, cancel| {
            cancel.wait_timeout(Duration::from_secs(10));
            Err(CapabilityError::Cancelled)
        });
        let started = Instant::now();
        let err = h
            .coordinator
            .execute("slow", Payload::Null, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(h.stats.counters().total_timeouts, 1);
        assert_eq!(h.registry.in_flight("slow").unwrap(), 0);
        assert_eq!(h.coordinator.running(), 0);
    }

    #[test]
    fn test_caller_cancellation() {
        let h = harness(ExecutionConfig::default());
        register(&h, FunctionRecord::new("slow", "Slow"), |_, cancel| {
            cancel.wait_timeout(Duration::from_secs(10));
            Err(CapabilityError::Cancelled)
        });
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                token.cancel();
            })
        };
        let request = ExecutionRequest::new("slow", Payload::Null, Duration::from_secs(10));
        let err = h.coordinator.execute_request(&request, &token).unwrap_err();
        canceller.join().unwrap();
        assert_eq!(err, ExecutionError::Cancelled(FunctionId::new("slow")));
        assert_eq!(h.registry.get("slow").unwrap().failure_count, 1);
    }

    #[test]
    fn test_ceiling_plus_one_is_overloaded() {
        let h = harness(ExecutionConfig {
            max_concurrent: 2,
            ..Default::default()
        });
        let gate = Arc::new(Barrier::new(3));
        let release = Arc::new(Barrier::new(3));
        {
            let (gate, release) = (Arc::clone(&gate), Arc::clone(&release));
            register(&h, FunctionRecord::new("hold", "Hold"), move |_, _| {
                gate.wait();
                release.wait();
                Ok(Payload::Null)
            });
        }

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let coordinator = Arc::clone(&h.coordinator);
                thread::spawn(move || coordinator.execute("hold", Payload::Null, SECOND * 10))
            })
            .collect();
        gate.wait();

        assert_eq!(h.coordinator.running(), 2);
        assert_eq!(h.registry.get("hold").unwrap().status, FunctionStatus::Running);
        let err = h.coordinator.execute("hold", Payload::Null, SECOND).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Overloaded {
                id: FunctionId::new("hold"),
                limit: 2
            }
        );
        assert_eq!(h.stats.counters().total_rejections, 1);

        release.wait();
        for worker in workers {
            assert!(worker.join().unwrap().is_ok());
        }
        assert_eq!(h.registry.get("hold").unwrap().status, FunctionStatus::Active);
    }

    #[test]
    fn test_ceiling_plus_one_distinct_functions() {
        // --- 1. ARRANGE ---
        let ceiling = 3;
        let h = harness(ExecutionConfig {
            max_concurrent: ceiling,
            ..Default::default()
        });
        let start = Arc::new(Barrier::new(ceiling + 1));
        let entered = Arc::new(Barrier::new(ceiling + 1));
        let release = Arc::new(Barrier::new(ceiling + 1));
        for n in 0..=ceiling {
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            let id = format!("hold-{n}");
            register(&h, FunctionRecord::new(id.as_str(), "Hold"), move |_, _| {
                entered.wait();
                release.wait();
                Ok(Payload::Null)
            });
        }

        // --- 2. ACT ---
        let workers: Vec<_> = (0..=ceiling)
            .map(|n| {
                let (coordinator, start) = (Arc::clone(&h.coordinator), Arc::clone(&start));
                thread::spawn(move || {
                    start.wait();
                    coordinator.execute(&format!("hold-{n}"), Payload::Null, SECOND * 10)
                })
            })
            .collect();
        entered.wait();

        // --- 3. ASSERT ---
        let running = h
            .registry
            .list(FunctionFilter::all().with_status(FunctionStatus::Running))
            .len();
        assert!(running <= ceiling);
        assert_eq!(h.coordinator.running(), ceiling);

        release.wait();
        let outcomes: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        let overloaded = outcomes
            .iter()
            .filter(|o| matches!(o, Err(ExecutionError::Overloaded { limit: 3, .. })))
            .count();
        assert!(overloaded >= 1);
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), ceiling);
        assert!(h
            .registry
            .list(FunctionFilter::all().with_status(FunctionStatus::Running))
            .is_empty());
    }

    #[test]
    fn test_cancel_while_queued_for_slot() {
        // --- 1. ARRANGE ---
        let h = harness(ExecutionConfig {
            max_concurrent: 1,
            overflow: OverflowPolicy::Queue {
                max_waiting: 4,
                max_wait_ms: 10_000,
            },
            ..Default::default()
        });
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        {
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            register(&h, FunctionRecord::new("hold", "Hold"), move |_, _| {
                entered.wait();
                release.wait();
                Ok(Payload::Null)
            });
        }
        register(&h, FunctionRecord::new("quick", "Quick"), |_, _| Ok(Payload::Null));
        let holder = {
            let coordinator = Arc::clone(&h.coordinator);
            thread::spawn(move || coordinator.execute("hold", Payload::Null, SECOND * 10))
        };
        entered.wait();

        // --- 2. ACT ---
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                token.cancel();
            })
        };
        let started = Instant::now();
        let request = ExecutionRequest::new("quick", Payload::Null, SECOND * 10);
        let outcome = h.coordinator.execute_request(&request, &token);
        let waited = started.elapsed();
        canceller.join().unwrap();

        // --- 3. ASSERT ---
        assert_eq!(outcome, Err(ExecutionError::Cancelled(FunctionId::new("quick"))));
        assert!(waited < Duration::from_secs(2));
        assert_eq!(h.registry.get("quick").unwrap().execution_count, 0);
        assert_eq!(h.stats.counters().total_rejections, 0);

        release.wait();
        assert!(holder.join().unwrap().is_ok());
    }

    #[test]
    fn test_breaker_matches_completion_order() {
        // --- 1. ARRANGE ---
        let h = harness(ExecutionConfig {
            max_concurrent: 8,
            ..Default::default()
        });
        register(&h, FunctionRecord::new("flaky", "Flaky"), |args, _| {
            match args.as_u64() {
                Some(n) if n % 2 == 0 => Err(CapabilityError::failed("even input")),
                _ => Ok(Payload::Null),
            }
        });
        let start = Arc::new(Barrier::new(8));

        // --- 2. ACT ---
        let workers: Vec<_> = (0..8u64)
            .map(|n| {
                let (coordinator, start) = (Arc::clone(&h.coordinator), Arc::clone(&start));
                thread::spawn(move || {
                    start.wait();
                    coordinator.execute("flaky", json!(n), SECOND)
                })
            })
            .collect();
        for worker in workers {
            let _ = worker.join().unwrap();
        }

        // --- 3. ASSERT ---
        let completions: Vec<bool> = h
            .events
            .try_iter()
            .filter_map(|event| match event {
                TelemetryEvent::ExecutionCompleted { success, .. } => Some(success),
                _ => None,
            })
            .collect();
        assert_eq!(completions.len(), 8);
        let trailing_failures = completions.iter().rev().take_while(|ok| !**ok).count();
        assert_eq!(
            h.breaker.state(&FunctionId::new("flaky")).failure_count,
            trailing_failures as u32
        );
        let record = h.registry.get("flaky").unwrap();
        assert_eq!((record.execution_count, record.failure_count), (8, 4));
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let h = harness(ExecutionConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            register(&h, FunctionRecord::new("geocode", "Geocode"), move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CapabilityError::failed("provider down"))
            });
        }
        for _ in 0..5 {
            assert!(matches!(
                h.coordinator.execute("geocode", Payload::Null, SECOND),
                Err(ExecutionError::ExecutionFailed { .. })
            ));
        }
        assert_eq!(
            h.coordinator.execute("geocode", Payload::Null, SECOND),
            Err(ExecutionError::CircuitOpen(FunctionId::new("geocode")))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(h.registry.get("geocode").unwrap().execution_count, 5);
    }

    #[test]
    fn test_sleeping_function_is_woken() {
        let h = harness(ExecutionConfig::default());
        register(&h, FunctionRecord::new("a", "A"), |_, _| Ok(json!("up")));
        h.lifecycle.force_sleep("a").unwrap();

        let result = h.coordinator.execute("a", Payload::Null, SECOND).unwrap();
        assert_eq!(result.output, Some(json!("up")));
        let record = h.registry.get("a").unwrap();
        assert_eq!(record.wake_count, 1);
        assert_eq!(record.status, FunctionStatus::Active);
    }

    #[test]
    fn test_retry_only_idempotent() {
        let h = harness(ExecutionConfig {
            retry: RetryPolicy {
                max_retries: 2,
                base_backoff_ms: 1,
                max_backoff_ms: 5,
            },
            ..Default::default()
        });
        let attempts = Arc::new(AtomicUsize::new(0));
        {
            let attempts = Arc::clone(&attempts);
            let flaky = FnCapability::new(move |_: &Payload, _: &CancellationToken| {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CapabilityError::failed("blip"))
                } else {
                    Ok(json!("ok"))
                }
            })
            .idempotent();
            h.registry
                .register(FunctionRecord::new("flaky", "Flaky"), Arc::new(flaky))
                .unwrap();
        }
        register(&h, FunctionRecord::new("once", "Once"), |_, _| {
            Err(CapabilityError::failed("blip"))
        });

        assert!(h.coordinator.execute("flaky", Payload::Null, SECOND).is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(h.coordinator.execute("once", Payload::Null, SECOND).is_err());
        assert_eq!(h.registry.get("once").unwrap().execution_count, 1);
    }

    #[test]
    fn test_backoff_is_bounded() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(9), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(1_000));
    }

    #[test]
    fn test_emergency_bypasses_ceiling() {
        let h = harness(ExecutionConfig {
            max_concurrent: 1,
            ..Default::default()
        });
        let gate = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        {
            let (gate, release) = (Arc::clone(&gate), Arc::clone(&release));
            register(&h, FunctionRecord::new("hold", "Hold"), move |_, _| {
                gate.wait();
                release.wait();
                Ok(Payload::Null)
            });
        }
        register(&h, FunctionRecord::new("vital", "Vital").critical(true), |_, _| {
            Ok(json!("alive"))
        });
        register(&h, FunctionRecord::new("plain", "Plain"), |_, _| Ok(Payload::Null));

        let worker = {
            let coordinator = Arc::clone(&h.coordinator);
            thread::spawn(move || coordinator.execute("hold", Payload::Null, SECOND * 10))
        };
        gate.wait();

        assert!(matches!(
            h.coordinator.execute("vital", Payload::Null, SECOND),
            Err(ExecutionError::Overloaded { .. })
        ));
        let request = ExecutionRequest::new("vital", Payload::Null, SECOND);
        let result = h
            .coordinator
            .execute_emergency(&request, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.output, Some(json!("alive")));

        let plain = ExecutionRequest::new("plain", Payload::Null, SECOND);
        assert!(matches!(
            h.coordinator
                .execute_emergency(&plain, &CancellationToken::new()),
            Err(ExecutionError::Registry(RegistryError::NotEmergencyEligible(_)))
        ));

        release.wait();
        assert!(worker.join().unwrap().is_ok());
    }

    #[test]
    fn test_critical_failure_raises_alert() {
        let h = harness(ExecutionConfig::default());
        register(&h, FunctionRecord::new("auth", "Auth").critical(true), |_, _| {
            Err(CapabilityError::failed("key store locked"))
        });
        assert!(h.coordinator.execute("auth", Payload::Null, SECOND).is_err());
        let alerts: Vec<_> = h
            .events
            .try_iter()
            .filter_map(|e| match e {
                TelemetryEvent::Alert(alert) => Some(alert),
                _ => None,
            })
            .collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(h.stats.counters().total_alerts, 1);
    }

    #[test]
    fn test_ceiling_is_clamped() {
        let h = harness(ExecutionConfig {
            min_concurrent: 2,
            max_concurrent_limit: 8,
            ..Default::default()
        });
        assert_eq!(h.coordinator.set_concurrency_ceiling(100), 8);
        assert_eq!(h.coordinator.set_concurrency_ceiling(0), 2);
        assert_eq!(h.coordinator.concurrency_ceiling(), 2);
    }

    #[test]
    fn test_panicking_implementation_is_a_failure() {
        let h = harness(ExecutionConfig::default());
        register(&h, FunctionRecord::new("boom", "Boom"), |_, _| {
            panic!("implementation bug")
        });
        let err = h.coordinator.execute("boom", Payload::Null, SECOND).unwrap_err();
        assert!(matches!(err, ExecutionError::ExecutionFailed { .. }));
        assert_eq!(h.registry.get("boom").unwrap().status, FunctionStatus::Active);
    }
}
