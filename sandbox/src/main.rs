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

// Hestia sandbox
// Runs a small workload against the function manager and logs what happens.
//
// Usage: sandbox [config.ron]

use anyhow::{Context, Result};
use hestia_sdk::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn load_config() -> Result<HestiaConfig> {
    match std::env::args().nth(1) {
        Some(path) => HestiaConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {path}")),
        None => Ok(HestiaConfig::default()),
    }
}

fn register_workload(manager: &FunctionManager) -> Result<()> {
    manager.register_fn(
        FunctionRecord::new("thumbnails", "Thumbnail renderer")
            .with_category(FunctionCategory::Optimization),
        |args, _| Ok(json!({ "rendered": args })),
    )?;
    manager.register_fn(
        FunctionRecord::new("auth", "Token check")
            .with_category(FunctionCategory::SecurityService)
            .critical(true),
        |args, _| Ok(json!({ "valid": !args.is_null() })),
    )?;

    // Fails every third call.
    let calls = Arc::new(AtomicU32::new(0));
    manager.register_fn(
        FunctionRecord::new("geocode", "Geocoder").with_category(FunctionCategory::Integration),
        move |args, _| {
            if calls.fetch_add(1, Ordering::Relaxed) % 3 == 2 {
                Err(CapabilityError::failed("upstream timeout"))
            } else {
                Ok(json!({ "query": args, "lat": 55.75, "lon": 37.62 }))
            }
        },
    )?;
    Ok(())
}

fn run_workload(manager: &FunctionManager) {
    let timeout = Duration::from_millis(500);
    for round in 0..12 {
        for id in ["thumbnails", "auth", "geocode"] {
            match manager.execute(id, json!({ "round": round }), timeout) {
                Ok(result) => log::debug!("{} -> {:?} in {:?}", id, result.output, result.duration),
                Err(err) => log::warn!("{} failed: {}", id, err),
            }
        }
    }
}

fn main() -> Result<()> {
    hestia_telemetry::logging::init("info");

    let mut manager = FunctionManager::open(load_config()?)?;
    manager.start()?;
    register_workload(&manager)?;
    run_workload(&manager);

    // Simulated load spike, then recovery.
    manager.report_resources(ResourceReport {
        cpu_load: 0.93,
        memory_load: 0.55,
    });
    let stressed = manager.analyze_now();
    log::info!(
        "Under load: {} finding(s), ceiling {}.",
        stressed.findings.len(),
        manager.concurrency_ceiling()
    );
    manager.report_resources(ResourceReport::default());
    manager.analyze_now();
    log::info!("Recovered: ceiling {}.", manager.concurrency_ceiling());

    if let MetricsReport::Global(report) = manager.report(ReportScope::Global)? {
        log::info!(
            "{} function(s), {} execution(s), failure rate {:.2}.",
            report.registered,
            report.counters.total_executions,
            report.failure_rate
        );
        for function in &report.functions {
            log::info!(
                "  {:<12} {:<10} runs={} failures={} quality={:.2}",
                function.id,
                function.status,
                function.execution_count,
                function.failure_count,
                function.quality_score
            );
        }
    }
    for alert in manager.alerts() {
        log::info!("Alert [{:?}] {}", alert.severity, alert.message);
    }
    log::info!("{} metric(s) exported.", manager.metrics().metric_count());

    manager.shutdown()?;
    Ok(())
}
