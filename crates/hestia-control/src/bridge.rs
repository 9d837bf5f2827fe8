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

//! The monitoring bridge.
//!
//! Runs the cold-path analysis loop: ingests telemetry from the execution
//! path, keeps rolling windows, runs the heuristic engine, raises alerts
//! once per condition, emits intent signals and exports metrics samples.

use crate::analysis::{AnalysisReport, HeuristicConfig, HeuristicEngine};
use crate::background::BackgroundTask;
use crate::circuit::CircuitBreaker;
use crate::context::LoadContext;
use crate::executor::ExecutionCoordinator;
use crate::metrics::{Series, SeriesStore};
use crate::registry::FunctionRegistry;
use crate::stats::StatisticsAggregator;
use crossbeam_channel::{Receiver, Sender};
use hestia_core::telemetry::{
    Alert, AlertSeverity, IntentSignal, MetricsSample, MetricsSink, TelemetryEvent,
};
use hestia_core::FunctionFilter;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Configuration for the [`MonitoringBridge`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Frequency of the analysis loop in Hz.
    pub tick_rate: u32,
    /// Maximum number of telemetry events to buffer.
    /// If the buffer is full, new events are dropped.
    pub event_buffer_size: usize,
    /// Maximum number of pending intent signals.
    pub signal_buffer_size: usize,
    /// Alerts kept in the in-memory history.
    pub alert_history: usize,
    /// Heuristic tuning.
    pub heuristics: HeuristicConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tick_rate: 2,
            event_buffer_size: 1024,
            signal_buffer_size: 64,
            alert_history: 256,
            heuristics: HeuristicConfig::default(),
        }
    }
}

#[derive(Debug, Default)]
struct BridgeState {
    store: SeriesStore,
    context: LoadContext,
    alerts: VecDeque<Alert>,
    active_conditions: HashSet<String>,
    tick_executions: u32,
    tick_failures: u32,
    tick_rejections: u32,
    last_report: Option<AnalysisReport>,
}

struct BridgeShared {
    config: BridgeConfig,
    engine: HeuristicEngine,
    registry: Arc<FunctionRegistry>,
    breaker: Arc<CircuitBreaker>,
    stats: Arc<StatisticsAggregator>,
    coordinator: Arc<ExecutionCoordinator>,
    sink: Option<Arc<dyn MetricsSink>>,
    state: Mutex<BridgeState>,
    event_rx: Receiver<TelemetryEvent>,
    signal_tx: Sender<IntentSignal>,
}

impl BridgeShared {
    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self) -> AnalysisReport {
        let mut state = self.lock();

        // 1. Ingest all pending events
        while let Ok(event) = self.event_rx.try_recv() {
            self.ingest(&mut state, event);
        }

        // 2. Close this tick's windows
        let executions = std::mem::take(&mut state.tick_executions);
        let failures = std::mem::take(&mut state.tick_failures);
        let rejections = std::mem::take(&mut state.tick_rejections);
        if executions > 0 {
            state
                .store
                .push(Series::FailureRatio, failures as f32 / executions as f32);
        }
        state.store.push(Series::Rejections, rejections as f32);

        // 3. Refresh the context and analyze
        state.context.concurrency_ceiling = self.coordinator.concurrency_ceiling();
        state.context.running = self.coordinator.running();
        state.context.refresh_stress(self.engine.stress_thresholds());
        let functions: Vec<_> = self.registry.list(FunctionFilter::all()).iter().collect();
        let report = self.engine.analyze(&state.context, &state.store, &functions);

        // 4. Alerts, once per condition
        let conditions: HashSet<String> =
            report.findings.iter().map(|f| f.condition.clone()).collect();
        for finding in &report.findings {
            if !state.active_conditions.contains(&finding.condition) {
                self.stats.record_alert();
                Self::log_alert(&finding.alert);
                self.push_alert(&mut state, finding.alert.clone());
            }
        }
        state.active_conditions = conditions;

        // 5. Intent signals
        for signal in report.signals() {
            log::debug!("Bridge signal: {:?}", signal);
            if self.signal_tx.try_send(signal).is_err() {
                log::trace!("Signal buffer full, dropping signal.");
            }
        }

        state.last_report = Some(report.clone());
        let sample = MetricsSample {
            counters: self.stats.counters(),
            functions,
            concurrency_ceiling: state.context.concurrency_ceiling,
            running: state.context.running,
            open_circuits: self.breaker.open_circuits().len(),
            cpu_load: state.context.resources.cpu_load,
            memory_load: state.context.resources.memory_load,
        };
        drop(state);

        // 6. Export
        if let Some(sink) = &self.sink {
            sink.publish(&sample);
        }
        report
    }

    fn ingest(&self, state: &mut BridgeState, event: TelemetryEvent) {
        match event {
            TelemetryEvent::ExecutionCompleted { success, .. } => {
                state.tick_executions += 1;
                if !success {
                    state.tick_failures += 1;
                }
            }
            TelemetryEvent::Rejected { .. } => {
                state.tick_rejections += 1;
            }
            TelemetryEvent::ResourceReport(report) => {
                state.context.resources = report;
                state.store.push(Series::CpuLoad, report.cpu_load);
                state.store.push(Series::MemoryLoad, report.memory_load);
                log::trace!(
                    "Bridge resources: cpu={:.2}, mem={:.2}",
                    report.cpu_load,
                    report.memory_load
                );
            }
            // Raised, logged and counted at the source.
            TelemetryEvent::Alert(alert) => self.push_alert(state, alert),
        }
    }

    fn push_alert(&self, state: &mut BridgeState, alert: Alert) {
        if self.config.alert_history == 0 {
            return;
        }
        while state.alerts.len() >= self.config.alert_history {
            state.alerts.pop_front();
        }
        state.alerts.push_back(alert);
    }

    fn log_alert(alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical => log::error!("Bridge alert: {}", alert),
            AlertSeverity::Warning => log::warn!("Bridge alert: {}", alert),
            AlertSeverity::Info => log::info!("Bridge alert: {}", alert),
        }
    }
}

/// The monitoring bridge service.
pub struct MonitoringBridge {
    shared: Arc<BridgeShared>,
    signal_rx: Receiver<IntentSignal>,
    task: Option<BackgroundTask>,
}

impl fmt::Debug for MonitoringBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoringBridge")
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl MonitoringBridge {
    /// Creates the telemetry channel sized for `config`. The sender goes into
    /// the execution path's [`EventSink`](crate::sink::EventSink), the
    /// receiver into [`MonitoringBridge::new`].
    pub fn channel(config: &BridgeConfig) -> (Sender<TelemetryEvent>, Receiver<TelemetryEvent>) {
        crossbeam_channel::bounded(config.event_buffer_size.max(1))
    }

    /// Creates a bridge reading `events`.
    pub fn new(
        config: BridgeConfig,
        events: Receiver<TelemetryEvent>,
        coordinator: Arc<ExecutionCoordinator>,
        registry: Arc<FunctionRegistry>,
        breaker: Arc<CircuitBreaker>,
        stats: Arc<StatisticsAggregator>,
    ) -> Self {
        let (signal_tx, signal_rx) = crossbeam_channel::bounded(config.signal_buffer_size.max(1));
        let nominal = coordinator.concurrency_ceiling();
        let (low, high) = coordinator.ceiling_bounds();
        let engine = HeuristicEngine::new(config.heuristics.clone(), nominal, low, high);
        Self {
            shared: Arc::new(BridgeShared {
                config,
                engine,
                registry,
                breaker,
                stats,
                coordinator,
                sink: None,
                state: Mutex::new(BridgeState::default()),
                event_rx: events,
                signal_tx,
            }),
            signal_rx,
            task: None,
        }
    }

    /// Exports a metrics sample to `sink` on every tick. Must be called
    /// before [`start`](Self::start).
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.sink = Some(sink),
            None => log::warn!("Bridge already running, metrics sink ignored."),
        }
        self
    }

    /// Starts the analysis thread.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        let tick_rate = self.shared.config.tick_rate.max(1);
        let tick = Duration::from_secs_f32(1.0 / tick_rate as f32);
        let shared = Arc::clone(&self.shared);
        self.task = Some(BackgroundTask::periodic("hestia-bridge", tick, move || {
            shared.tick();
        })?);
        log::info!("Monitoring bridge started ({} Hz).", tick_rate);
        Ok(())
    }

    /// Stops the analysis thread.
    pub fn stop(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.stop();
            log::info!("Monitoring bridge stopped.");
        }
    }

    /// Returns `true` while the analysis thread runs.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(BackgroundTask::is_running)
    }

    /// Runs one analysis iteration on the calling thread.
    pub fn tick(&self) -> AnalysisReport {
        self.shared.tick()
    }

    /// Receiver of the intent signals the bridge emits.
    pub fn signals(&self) -> Receiver<IntentSignal> {
        self.signal_rx.clone()
    }

    /// Alert history, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.shared.lock().alerts.iter().cloned().collect()
    }

    /// The current load context.
    pub fn context(&self) -> LoadContext {
        self.shared.lock().context.clone()
    }

    /// The report of the latest tick.
    pub fn last_report(&self) -> Option<AnalysisReport> {
        self.shared.lock().last_report.clone()
    }
}

impl Drop for MonitoringBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
