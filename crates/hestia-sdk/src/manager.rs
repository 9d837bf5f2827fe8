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

//! The function manager: one owned context wiring every component together.

use crate::config::HestiaConfig;
use crate::error::HestiaError;
use crate::persistence::Persister;
use crossbeam_channel::Receiver;
use hestia_control::{
    AnalysisReport, BackgroundTask, CircuitBreaker, EventSink, ExecutionCoordinator,
    FunctionListing, FunctionRegistry, LifecycleController, MetricsReport, MonitoringBridge,
    ReportScope, SaveRequest, SaveTrigger, SignalApplier, SleepEvaluation, StatisticsAggregator,
};
use hestia_core::telemetry::{Alert, ResourceReport, TelemetryEvent};
use hestia_core::{
    CancellationToken, Capability, CapabilityError, CircuitState, ExecutionError,
    ExecutionRequest, ExecutionResult, FnCapability, FunctionFilter, FunctionId, FunctionRecord,
    Payload, PersistenceError, RegistryError, SecurityLevel, Snapshot,
};
use hestia_io::SnapshotStore;
use hestia_telemetry::{MetricsPublisher, MetricsRegistry};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Owns the registry and every service operating on it.
///
/// [`open`](Self::open) loads the persisted snapshot, [`start`](Self::start)
/// launches the background services and [`shutdown`](Self::shutdown) stops
/// them and saves a final snapshot. Dropping the manager shuts it down.
pub struct FunctionManager {
    config: HestiaConfig,
    registry: Arc<FunctionRegistry>,
    breaker: Arc<CircuitBreaker>,
    stats: Arc<StatisticsAggregator>,
    lifecycle: Arc<LifecycleController>,
    coordinator: Arc<ExecutionCoordinator>,
    events: EventSink,
    bridge: MonitoringBridge,
    applier: Arc<SignalApplier>,
    persister: Arc<Persister>,
    save_requests: Receiver<SaveRequest>,
    metrics: MetricsRegistry,
    tasks: Vec<BackgroundTask>,
}

impl std::fmt::Debug for FunctionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionManager")
            .field("functions", &self.registry.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FunctionManager {
    /// Builds every component and restores the persisted snapshot.
    ///
    /// A missing or corrupt snapshot is not an error: the registry starts
    /// empty and a warning is logged.
    pub fn open(config: HestiaConfig) -> Result<Self, HestiaError> {
        config.validate()?;

        let registry = Arc::new(FunctionRegistry::new(config.registry.clone()));
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let stats = Arc::new(StatisticsAggregator::new(
            config.statistics.clone(),
            Arc::clone(&registry),
        ));
        let (event_tx, event_rx) = MonitoringBridge::channel(&config.bridge);
        let events = EventSink::new(event_tx);
        let (save, save_requests) = SaveTrigger::channel();
        let lifecycle = Arc::new(LifecycleController::new(
            config.lifecycle.clone(),
            Arc::clone(&registry),
            Arc::clone(&stats),
            events.clone(),
            save,
        ));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            config.execution.clone(),
            Arc::clone(&registry),
            Arc::clone(&breaker),
            Arc::clone(&lifecycle),
            Arc::clone(&stats),
            events.clone(),
        ));

        let metrics = MetricsRegistry::new();
        let bridge = MonitoringBridge::new(
            config.bridge.clone(),
            event_rx,
            Arc::clone(&coordinator),
            Arc::clone(&registry),
            Arc::clone(&breaker),
            Arc::clone(&stats),
        )
        .with_metrics_sink(Arc::new(MetricsPublisher::new(metrics.clone())));
        let applier = Arc::new(SignalApplier::new(
            Arc::clone(&coordinator),
            Arc::clone(&lifecycle),
        ));

        let store = config.persistence.path.clone().map(SnapshotStore::new);
        let persister = Arc::new(Persister::new(store, Arc::clone(&registry), Arc::clone(&stats)));
        let restored = persister.restore();
        log::info!(
            "Function manager opened, {} record(s) awaiting registration.",
            restored
        );

        Ok(Self {
            config,
            registry,
            breaker,
            stats,
            lifecycle,
            coordinator,
            events,
            bridge,
            applier,
            persister,
            save_requests,
            metrics,
            tasks: Vec::new(),
        })
    }

    /// Starts the monitoring bridge, the signal applier, the lifecycle
    /// evaluator and, when a snapshot path is configured, the autosave worker.
    pub fn start(&mut self) -> Result<(), HestiaError> {
        if self.is_running() {
            return Ok(());
        }
        self.bridge.start()?;
        self.tasks
            .push(Arc::clone(&self.applier).spawn(self.bridge.signals())?);
        self.tasks.push(self.lifecycle.spawn_evaluator()?);
        if self.persister.store().is_some() {
            let interval = Duration::from_millis(self.config.persistence.autosave_interval_ms);
            self.tasks.push(
                self.persister
                    .spawn_autosave(interval, self.save_requests.clone())?,
            );
        }
        log::info!("Function manager started.");
        Ok(())
    }

    /// Returns `true` while the background services run.
    pub fn is_running(&self) -> bool {
        self.bridge.is_running()
    }

    /// Stops the background services and saves the final snapshot.
    pub fn shutdown(&mut self) -> Result<(), HestiaError> {
        let was_running = self.is_running();
        self.bridge.stop();
        for mut task in self.tasks.drain(..) {
            task.stop();
        }
        if self.config.persistence.save_on_shutdown && self.persister.save(false)? {
            log::info!("Final snapshot saved.");
        }
        if was_running {
            log::info!("Function manager shut down.");
        }
        Ok(())
    }

    pub fn config(&self) -> &HestiaConfig {
        &self.config
    }

    // ── Registration ─────────────────────────────────────────────────────

    /// Registers a function and its implementation.
    pub fn register(
        &self,
        record: FunctionRecord,
        capability: Arc<dyn Capability>,
    ) -> Result<FunctionRecord, RegistryError> {
        self.registry.register(record, capability)
    }

    /// Registers a closure as the implementation of a function.
    pub fn register_fn<F>(
        &self,
        record: FunctionRecord,
        func: F,
    ) -> Result<FunctionRecord, RegistryError>
    where
        F: Fn(&Payload, &CancellationToken) -> Result<Payload, CapabilityError>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(record, Arc::new(FnCapability::new(func)))
    }

    /// Registers a function, replacing an existing registration.
    pub fn register_or_replace(
        &self,
        record: FunctionRecord,
        capability: Arc<dyn Capability>,
    ) -> Result<FunctionRecord, RegistryError> {
        self.registry.register_or_replace(record, capability)
    }

    /// Removes a function. Refused while executions are in flight.
    pub fn unregister(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        let record = self.registry.unregister(id)?;
        self.breaker.reset(&record.id);
        self.stats.forget(&record.id);
        Ok(record)
    }

    // ── Execution ────────────────────────────────────────────────────────

    pub fn execute(
        &self,
        id: &str,
        args: Payload,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.coordinator.execute(id, args, timeout)
    }

    /// Executes with the configured default timeout.
    pub fn execute_default(
        &self,
        id: &str,
        args: Payload,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.coordinator.execute_default(id, args)
    }

    /// Executes `request`, giving up when `cancel` fires.
    pub fn execute_request(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.coordinator.execute_request(request, cancel)
    }

    /// Executes an emergency-eligible function outside the concurrency ceiling.
    pub fn execute_emergency(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.coordinator.execute_emergency(request, cancel)
    }

    pub fn get_status(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.registry.get(id)
    }

    /// Lists the functions matching `filter`.
    pub fn list(&self, filter: FunctionFilter) -> FunctionListing<'_> {
        self.registry.list(filter)
    }

    // ── Administration ───────────────────────────────────────────────────

    pub fn set_critical(&self, id: &str, critical: bool) -> Result<FunctionRecord, RegistryError> {
        self.lifecycle.set_critical(id, critical)
    }

    pub fn set_security_level(
        &self,
        id: &str,
        level: SecurityLevel,
    ) -> Result<FunctionRecord, RegistryError> {
        self.registry.set_security_level(id, level)
    }

    pub fn force_sleep(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.lifecycle.force_sleep(id)
    }

    pub fn force_wake(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.lifecycle.force_wake(id)
    }

    /// Wakes an emergency-eligible function and saves right away.
    pub fn emergency_wake(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.lifecycle.emergency_wake(id)
    }

    /// Disables a function. Idempotent.
    pub fn disable(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.lifecycle.disable(id)
    }

    pub fn enable(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.lifecycle.enable(id)
    }

    /// Clears the `ERROR` or `DISABLED` state of a function. It becomes
    /// `ACTIVE` again when registered with `auto_enable`, `REGISTERED`
    /// otherwise.
    pub fn reset(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.lifecycle.reset(id)
    }

    /// Clears the `ERROR` state only. A disabled function is refused.
    pub fn reset_error(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.lifecycle.reset_error(id)
    }

    /// Moves a function to `ERROR` after an unrecoverable fault.
    pub fn report_fault(&self, id: &str, reason: &str) -> Result<FunctionRecord, RegistryError> {
        self.lifecycle.report_fault(id, reason)
    }

    // ── Monitoring ───────────────────────────────────────────────────────

    /// Feeds host CPU and memory load to the monitoring bridge. Returns
    /// `false` if the report was dropped.
    pub fn report_resources(&self, report: ResourceReport) -> bool {
        self.events.emit(TelemetryEvent::ResourceReport(report))
    }

    pub fn report(&self, scope: ReportScope) -> Result<MetricsReport, RegistryError> {
        self.stats.report(scope)
    }

    /// Alerts retained by the monitoring bridge, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.bridge.alerts()
    }

    pub fn circuit_state(&self, id: &str) -> CircuitState {
        self.breaker.state(&FunctionId::new(id))
    }

    pub fn concurrency_ceiling(&self) -> usize {
        self.coordinator.concurrency_ceiling()
    }

    /// Sets the global ceiling within the configured bounds.
    pub fn set_concurrency_ceiling(&self, ceiling: usize) -> usize {
        self.coordinator.set_concurrency_ceiling(ceiling)
    }

    /// The exported metrics.
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Runs one monitoring pass now and applies the resulting signals.
    pub fn analyze_now(&self) -> AnalysisReport {
        let report = self.bridge.tick();
        for signal in self.bridge.signals().try_iter() {
            if let Err(err) = self.applier.apply(&signal) {
                log::warn!("Signal {:?} refused: {}", signal, err);
            }
        }
        report
    }

    /// Runs one lifecycle evaluation pass now.
    pub fn evaluate_lifecycle(&self) -> SleepEvaluation {
        self.lifecycle.evaluate_sleep_candidates()
    }

    // ── Persistence ──────────────────────────────────────────────────────

    /// Captures the full registry state and global counters.
    pub fn snapshot(&self) -> Snapshot {
        self.persister.snapshot()
    }

    /// Saves to the configured path. Returns `false` when no path is set.
    pub fn save(&self) -> Result<bool, PersistenceError> {
        self.persister.save(true)
    }

    /// Saves to `path`, independent of the configured one.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        self.persister.save_to(&SnapshotStore::new(path.as_ref()))
    }

    /// Reads the snapshot at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Snapshot, PersistenceError> {
        SnapshotStore::new(path.as_ref()).load()
    }
}

impl Drop for FunctionManager {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("Shutdown failed: {}", err);
        }
    }
}
