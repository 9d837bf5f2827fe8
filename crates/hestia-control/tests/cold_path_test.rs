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

use hestia_control::{
    BridgeConfig, CircuitBreaker, CircuitBreakerConfig, EventSink, ExecutionConfig,
    ExecutionCoordinator, FunctionRegistry, LifecycleConfig, LifecycleController,
    MonitoringBridge, SaveTrigger, SignalApplier, StatisticsAggregator, StatisticsConfig,
};
use hestia_core::telemetry::{IntentSignal, ResourceReport, TelemetryEvent};
use hestia_core::{CancellationToken, FnCapability, FunctionRecord, FunctionStatus, Payload};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct ColdPath {
    registry: Arc<FunctionRegistry>,
    lifecycle: Arc<LifecycleController>,
    coordinator: Arc<ExecutionCoordinator>,
    events: EventSink,
    bridge: MonitoringBridge,
    applier: SignalApplier,
}

fn cold_path() -> ColdPath {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = BridgeConfig::default();
    let registry = Arc::new(FunctionRegistry::default());
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
    let stats = Arc::new(StatisticsAggregator::new(
        StatisticsConfig::default(),
        Arc::clone(&registry),
    ));
    let (tx, rx) = MonitoringBridge::channel(&config);
    let events = EventSink::new(tx);
    let lifecycle = Arc::new(LifecycleController::new(
        LifecycleConfig::default(),
        Arc::clone(&registry),
        Arc::clone(&stats),
        events.clone(),
        SaveTrigger::disabled(),
    ));
    let coordinator = Arc::new(ExecutionCoordinator::new(
        ExecutionConfig {
            max_concurrent: 10,
            ..Default::default()
        },
        Arc::clone(&registry),
        Arc::clone(&breaker),
        Arc::clone(&lifecycle),
        Arc::clone(&stats),
        events.clone(),
    ));
    let bridge = MonitoringBridge::new(
        config,
        rx,
        Arc::clone(&coordinator),
        Arc::clone(&registry),
        breaker,
        stats,
    );
    let applier = SignalApplier::new(Arc::clone(&coordinator), Arc::clone(&lifecycle));
    ColdPath {
        registry,
        lifecycle,
        coordinator,
        events,
        bridge,
        applier,
    }
}

fn register(registry: &FunctionRegistry, record: FunctionRecord) {
    registry
        .register(
            record,
            Arc::new(FnCapability::new(|_: &Payload, _: &CancellationToken| {
                Ok(Payload::Null)
            })),
        )
        .unwrap();
}

fn drain(cp: &ColdPath) {
    for signal in cp.bridge.signals().try_iter() {
        let _ = cp.applier.apply(&signal);
    }
}

#[test]
fn test_stress_sheds_load_and_recovers() {
    // --- 1. ARRANGE ---
    let cp = cold_path();
    register(&cp.registry, FunctionRecord::new("thumbnails", "Thumbnails"));
    register(&cp.registry, FunctionRecord::new("search", "Search"));
    register(&cp.registry, FunctionRecord::new("auth", "Auth").critical(true));

    // --- 2. ACT: severe CPU pressure ---
    cp.events.emit(TelemetryEvent::ResourceReport(ResourceReport {
        cpu_load: 0.92,
        memory_load: 0.40,
    }));
    let report = cp.bridge.tick();
    drain(&cp);
    let slept = cp
        .lifecycle
        .evaluate_at(Instant::now() + Duration::from_secs(31))
        .slept;

    // --- 3. ASSERT ---
    assert_eq!(report.suggested_ceiling, Some(6));
    assert_eq!(cp.coordinator.concurrency_ceiling(), 6);
    assert_eq!(slept.len(), 2);
    assert_eq!(cp.registry.get("auth").unwrap().status, FunctionStatus::Active);
    assert_eq!(
        cp.registry.get("search").unwrap().status,
        FunctionStatus::Sleeping
    );

    // --- 4. Pressure gone: the ceiling returns to nominal ---
    cp.events
        .emit(TelemetryEvent::ResourceReport(ResourceReport::default()));
    cp.bridge.tick();
    drain(&cp);
    assert_eq!(cp.coordinator.concurrency_ceiling(), 10);
}

#[test]
fn test_sleeping_critical_function_is_woken_under_stress() {
    let cp = cold_path();
    register(&cp.registry, FunctionRecord::new("auth", "Auth").critical(true));
    cp.lifecycle.force_sleep("auth").unwrap();

    cp.events.emit(TelemetryEvent::ResourceReport(ResourceReport {
        cpu_load: 0.10,
        memory_load: 0.95,
    }));
    cp.bridge.tick();
    let signals: Vec<IntentSignal> = cp.bridge.signals().try_iter().collect();
    assert!(signals
        .iter()
        .any(|s| matches!(s, IntentSignal::EmergencyWake { .. })));
    for signal in &signals {
        let _ = cp.applier.apply(signal);
    }

    let record = cp.registry.get("auth").unwrap();
    assert_eq!(record.status, FunctionStatus::Active);
    assert_eq!(record.wake_count, 1);
}

#[test]
fn test_background_services_run_together() {
    let cp = cold_path();
    let ColdPath {
        coordinator,
        events,
        mut bridge,
        applier,
        ..
    } = cp;
    let signals = bridge.signals();
    let mut applier_task = Arc::new(applier).spawn(signals).unwrap();
    bridge.start().unwrap();

    events.emit(TelemetryEvent::ResourceReport(ResourceReport {
        cpu_load: 0.99,
        memory_load: 0.20,
    }));
    let deadline = Instant::now() + Duration::from_secs(3);
    while coordinator.concurrency_ceiling() != 1 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    bridge.stop();
    applier_task.stop();
    assert_eq!(coordinator.concurrency_ceiling(), 1);
    assert!(bridge
        .alerts()
        .iter()
        .any(|a| a.message.starts_with("overload")));
}
