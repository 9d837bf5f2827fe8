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

//! Publishes bridge samples into a [`MetricsRegistry`].
//!
//! Global values live in the `hestia` namespace. Per-function values live in
//! the `function` namespace, labelled `function=<id>`.

use crate::metrics::{ExportError, MetricId, MetricsRegistry};
use hestia_core::telemetry::{MetricsSample, MetricsSink};
use hestia_core::{FunctionId, FunctionRecord, FunctionStatus};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Namespace of process-wide metrics.
pub const GLOBAL_NAMESPACE: &str = "hestia";
/// Namespace of per-function metrics.
pub const FUNCTION_NAMESPACE: &str = "function";
/// Label naming the function a metric belongs to.
pub const FUNCTION_LABEL: &str = "function";

const STATUSES: [FunctionStatus; 6] = [
    FunctionStatus::Registered,
    FunctionStatus::Active,
    FunctionStatus::Running,
    FunctionStatus::Sleeping,
    FunctionStatus::Disabled,
    FunctionStatus::Error,
];

/// A [`MetricsSink`] writing every sample into a [`MetricsRegistry`].
#[derive(Debug)]
pub struct MetricsPublisher {
    registry: MetricsRegistry,
    published: Mutex<HashSet<FunctionId>>,
}

impl MetricsPublisher {
    pub fn new(registry: MetricsRegistry) -> Self {
        Self {
            registry,
            published: Mutex::new(HashSet::new()),
        }
    }

    /// The registry samples are written to.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    fn publish_globals(&self, sample: &MetricsSample) -> Result<(), ExportError> {
        let r = &self.registry;
        let c = &sample.counters;
        for (name, description, total) in [
            ("executions_total", "Dispatched executions", c.total_executions),
            ("failures_total", "Failed executions", c.total_failures),
            ("timeouts_total", "Executions that timed out", c.total_timeouts),
            ("rejections_total", "Requests rejected before dispatch", c.total_rejections),
            ("wakes_total", "Functions woken", c.total_wakes),
            ("sleeps_total", "Functions put to sleep", c.total_sleeps),
            ("alerts_total", "Alerts raised", c.total_alerts),
        ] {
            r.record_counter(&global(name), description, total)?;
        }

        r.record_gauge(
            &global("concurrency_ceiling"),
            "Global concurrency ceiling",
            "count",
            sample.concurrency_ceiling as f64,
        )?;
        r.record_gauge(
            &global("running"),
            "Executions holding a slot",
            "count",
            sample.running as f64,
        )?;
        r.record_gauge(
            &global("open_circuits"),
            "Circuit breakers not closed",
            "count",
            sample.open_circuits as f64,
        )?;
        r.record_gauge(&global("cpu_load"), "Reported CPU load", "ratio", sample.cpu_load as f64)?;
        r.record_gauge(
            &global("memory_load"),
            "Reported memory load",
            "ratio",
            sample.memory_load as f64,
        )?;
        for status in STATUSES {
            let count = sample.functions.iter().filter(|f| f.status == status).count();
            r.record_gauge(
                &global("functions").with_label("status", status.as_str()),
                "Registered functions by status",
                "count",
                count as f64,
            )?;
        }
        Ok(())
    }

    fn publish_function(&self, record: &FunctionRecord) -> Result<(), ExportError> {
        let r = &self.registry;
        let id = |name: &str| {
            MetricId::new(FUNCTION_NAMESPACE, name).with_label(FUNCTION_LABEL, record.id.as_str())
        };
        r.record_counter(&id("executions_total"), "Executions", record.execution_count)?;
        r.record_counter(&id("failures_total"), "Failed executions", record.failure_count)?;
        r.record_counter(&id("wakes_total"), "Wakes", record.wake_count)?;
        let failure_rate = record.failure_rate();
        r.record_gauge(&id("failure_rate"), "Share of failed executions", "ratio", failure_rate)?;
        let quality = record.quality_score;
        r.record_gauge(&id("quality_score"), "Moving average of success", "ratio", quality)?;
        r.record_gauge(
            &id("average_duration_ms"),
            "Moving average of duration",
            "ms",
            record.average_duration_ms,
        )?;
        r.record_gauge(
            &id("dispatchable"),
            "1 when the function accepts dispatch without waking",
            "bool",
            if record.status.is_dispatchable() { 1.0 } else { 0.0 },
        )
    }
}

impl MetricsSink for MetricsPublisher {
    fn publish(&self, sample: &MetricsSample) {
        if let Err(err) = self.publish_globals(sample) {
            log::warn!("Failed to publish global metrics: {}", err);
        }

        let current: HashSet<FunctionId> = sample.functions.iter().map(|f| f.id.clone()).collect();
        for record in &sample.functions {
            if let Err(err) = self.publish_function(record) {
                log::warn!("Failed to publish metrics of '{}': {}", record.id, err);
            }
        }

        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        for gone in published.difference(&current) {
            let removed = self.registry.remove_labelled(FUNCTION_LABEL, gone.as_str());
            log::debug!("Dropped {} metric(s) of unregistered '{}'.", removed, gone);
        }
        *published = current;
    }
}

fn global(name: &str) -> MetricId {
    MetricId::new(GLOBAL_NAMESPACE, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_core::GlobalCounters;

    fn record(id: &str, executions: u64, failures: u64) -> FunctionRecord {
        let mut record = FunctionRecord::new(id, id);
        record.status = FunctionStatus::Active;
        record.execution_count = executions;
        record.failure_count = failures;
        record
    }

    fn value(registry: &MetricsRegistry, id: MetricId) -> f64 {
        registry.get_metric(&id).unwrap().value.as_f64()
    }

    #[test]
    fn test_sample_is_published() {
        let publisher = MetricsPublisher::new(MetricsRegistry::new());
        let sample = MetricsSample {
            counters: GlobalCounters {
                total_executions: 10,
                total_failures: 4,
                ..Default::default()
            },
            functions: vec![record("geocode", 8, 4), record("auth", 2, 0)],
            concurrency_ceiling: 4,
            running: 1,
            open_circuits: 1,
            cpu_load: 0.5,
            memory_load: 0.25,
        };
        publisher.publish(&sample);

        let r = publisher.registry();
        assert_eq!(value(r, global("executions_total")), 10.0);
        assert_eq!(value(r, global("concurrency_ceiling")), 4.0);
        assert_eq!(value(r, global("functions").with_label("status", "active")), 2.0);
        let geocode = |name: &str| {
            MetricId::new(FUNCTION_NAMESPACE, name).with_label(FUNCTION_LABEL, "geocode")
        };
        assert_eq!(value(r, geocode("failures_total")), 4.0);
        assert_eq!(value(r, geocode("failure_rate")), 0.5);
        assert_eq!(value(r, geocode("dispatchable")), 1.0);
    }

    #[test]
    fn test_unregistered_function_metrics_are_dropped() {
        let publisher = MetricsPublisher::new(MetricsRegistry::new());
        let mut sample = MetricsSample {
            functions: vec![record("geocode", 1, 0), record("auth", 1, 0)],
            ..Default::default()
        };
        publisher.publish(&sample);
        assert!(!publisher
            .registry()
            .get_labelled_metrics(FUNCTION_LABEL, "geocode")
            .is_empty());

        sample.functions.retain(|f| f.id.as_str() == "auth");
        publisher.publish(&sample);
        assert!(publisher
            .registry()
            .get_labelled_metrics(FUNCTION_LABEL, "geocode")
            .is_empty());
        assert!(!publisher
            .registry()
            .get_labelled_metrics(FUNCTION_LABEL, "auth")
            .is_empty());
    }
}
