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

//! The metrics registry and its text exposition.

use super::model::{ExportError, Metric, MetricId, MetricValue};
use crate::storage::{InMemoryBackend, MetricsBackend};
use std::fmt::Write as _;
use std::sync::Arc;

/// Shared handle to the exported metrics.
///
/// Cloning is cheap; every clone writes to the same backend.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    backend: Arc<dyn MetricsBackend>,
}

impl MetricsRegistry {
    /// A registry over an [`InMemoryBackend`].
    pub fn new() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    /// Sets a counter to `total`, creating it on first use.
    pub fn record_counter(&self, id: &MetricId, help: &str, total: u64) -> Result<(), ExportError> {
        self.backend
            .upsert(id, help, "count", MetricValue::Counter(total))
    }

    /// Sets a gauge to `value`, creating it on first use.
    pub fn record_gauge(
        &self,
        id: &MetricId,
        help: &str,
        unit: &str,
        value: f64,
    ) -> Result<(), ExportError> {
        self.backend.upsert(id, help, unit, MetricValue::Gauge(value))
    }

    pub fn get_metric(&self, id: &MetricId) -> Option<Metric> {
        self.backend.get(id)
    }

    pub fn contains_metric(&self, id: &MetricId) -> bool {
        self.backend.get(id).is_some()
    }

    pub fn get_namespace_metrics(&self, namespace: &str) -> Vec<Metric> {
        self.backend.matching(&|m| m.id.namespace == namespace)
    }

    /// Every series carrying the label `key=value`.
    pub fn get_labelled_metrics(&self, key: &str, value: &str) -> Vec<Metric> {
        self.backend.matching(&|m| m.id.label(key) == Some(value))
    }

    /// Drops every series carrying the label `key=value`. Returns how many
    /// were removed.
    pub fn remove_labelled(&self, key: &str, value: &str) -> usize {
        self.backend.retain(&|m| m.id.label(key) != Some(value))
    }

    pub fn metric_count(&self) -> usize {
        self.backend.len()
    }

    /// Renders every series in the Prometheus text exposition format.
    ///
    /// Series of one family share a single `# HELP` and `# TYPE` header,
    /// taken from the first series of the family.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mut previous: Option<MetricId> = None;
        for metric in self.backend.all() {
            let new_family = previous
                .as_ref()
                .is_none_or(|p| !p.same_family(&metric.id));
            if new_family {
                let family = metric.id.family();
                let _ = writeln!(out, "# HELP {} {}", family, metric.help);
                let _ = writeln!(out, "# TYPE {} {}", family, metric.kind().as_str());
            }
            let _ = writeln!(out, "{} {}", metric.id, metric.value);
            previous = Some(metric.id);
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;

    fn per_function(name: &str, id: &str) -> MetricId {
        MetricId::new("function", name).with_label("function", id)
    }

    #[test]
    fn test_record_creates_then_updates() {
        let registry = MetricsRegistry::new();
        let id = MetricId::new("hestia", "wakes_total");

        registry.record_counter(&id, "Wakes", 3).unwrap();
        registry.record_counter(&id, "Wakes", 7).unwrap();

        assert_eq!(registry.get_metric(&id).unwrap().value.as_counter(), Some(7));
        assert_eq!(registry.metric_count(), 1);
    }

    #[test]
    fn test_kind_cannot_change() {
        let registry = MetricsRegistry::new();
        let id = MetricId::new("hestia", "wakes_total");
        registry.record_counter(&id, "Wakes", 1).unwrap();

        assert_eq!(
            registry.record_gauge(&id, "Wakes", "count", 1.0),
            Err(ExportError::KindConflict {
                id,
                existing: MetricKind::Counter,
                requested: MetricKind::Gauge,
            })
        );
    }

    #[test]
    fn test_remove_labelled() {
        let registry = MetricsRegistry::new();
        for name in ["executions_total", "failures_total"] {
            registry.record_counter(&per_function(name, "geocode"), name, 1).unwrap();
            registry.record_counter(&per_function(name, "auth"), name, 1).unwrap();
        }
        registry
            .record_counter(&MetricId::new("hestia", "executions_total"), "total", 2)
            .unwrap();

        assert_eq!(registry.get_labelled_metrics("function", "geocode").len(), 2);
        assert_eq!(registry.remove_labelled("function", "geocode"), 2);
        assert_eq!(registry.metric_count(), 3);
        assert_eq!(registry.get_namespace_metrics("hestia").len(), 1);
    }

    #[test]
    fn test_render_text_groups_families() {
        let registry = MetricsRegistry::new();
        registry
            .record_gauge(
                &per_function("failure_rate", "geocode"),
                "Share of failed executions",
                "ratio",
                0.5,
            )
            .unwrap();
        registry
            .record_gauge(
                &per_function("failure_rate", "auth"),
                "Share of failed executions",
                "ratio",
                0.0,
            )
            .unwrap();
        registry
            .record_counter(
                &MetricId::new("hestia", "executions_total"),
                "Dispatched executions",
                12,
            )
            .unwrap();

        let text = registry.render_text();

        assert_eq!(
            text,
            "# HELP function_failure_rate Share of failed executions\n\
             # TYPE function_failure_rate gauge\n\
             function_failure_rate{function=\"auth\"} 0\n\
             function_failure_rate{function=\"geocode\"} 0.5\n\
             # HELP hestia_executions_total Dispatched executions\n\
             # TYPE hestia_executions_total counter\n\
             hestia_executions_total 12\n"
        );
    }
}
