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

use super::backend::MetricsBackend;
use crate::metrics::{ExportError, Metric, MetricId, MetricValue};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Process-local [`MetricsBackend`]. Series live until removed.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    series: RwLock<BTreeMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<MetricId, Metric>> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<MetricId, Metric>> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsBackend for InMemoryBackend {
    fn upsert(
        &self,
        id: &MetricId,
        help: &str,
        unit: &str,
        value: MetricValue,
    ) -> Result<(), ExportError> {
        match self.write().entry(id.clone()) {
            Entry::Occupied(mut slot) => {
                let metric = slot.get_mut();
                if metric.kind() != value.kind() {
                    return Err(ExportError::KindConflict {
                        id: id.clone(),
                        existing: metric.kind(),
                        requested: value.kind(),
                    });
                }
                metric.value = value;
            }
            Entry::Vacant(slot) => {
                log::trace!("New series {}.", id);
                slot.insert(Metric {
                    id: id.clone(),
                    help: help.to_string(),
                    unit: unit.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }

    fn get(&self, id: &MetricId) -> Option<Metric> {
        self.read().get(id).cloned()
    }

    fn all(&self) -> Vec<Metric> {
        self.read().values().cloned().collect()
    }

    fn retain(&self, keep: &dyn Fn(&Metric) -> bool) -> usize {
        let mut series = self.write();
        let before = series.len();
        series.retain(|_, metric| keep(metric));
        before - series.len()
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn matching(&self, filter: &dyn Fn(&Metric) -> bool) -> Vec<Metric> {
        self.read()
            .values()
            .filter(|m| filter(m))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge(backend: &InMemoryBackend, id: &MetricId, value: f64) {
        backend
            .upsert(id, "help", "ratio", MetricValue::Gauge(value))
            .unwrap();
    }

    #[test]
    fn test_upsert_keeps_first_help_text() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("hestia", "cpu_load");
        gauge(&backend, &id, 0.2);
        backend
            .upsert(&id, "changed", "percent", MetricValue::Gauge(0.7))
            .unwrap();

        let metric = backend.get(&id).unwrap();
        assert_eq!(metric.help, "help");
        assert_eq!(metric.unit, "ratio");
        assert_eq!(metric.value, MetricValue::Gauge(0.7));
    }

    #[test]
    fn test_all_is_ordered_by_id() {
        let backend = InMemoryBackend::new();
        gauge(&backend, &MetricId::new("hestia", "running"), 1.0);
        let quality = |function: &str| {
            MetricId::new("function", "quality_score").with_label("function", function)
        };
        gauge(&backend, &quality("b"), 1.0);
        gauge(&backend, &quality("a"), 1.0);

        let ids: Vec<String> = backend.all().iter().map(|m| m.id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "function_quality_score{function=\"a\"}",
                "function_quality_score{function=\"b\"}",
                "hestia_running",
            ]
        );
    }

    #[test]
    fn test_retain_reports_removed() {
        let backend = InMemoryBackend::new();
        for ns in ["hestia", "function", "function"] {
            let id = MetricId::new(ns, "x").with_label("n", backend.len().to_string());
            gauge(&backend, &id, 0.0);
        }

        assert_eq!(backend.retain(&|m| m.id.namespace == "hestia"), 2);
        assert_eq!(backend.len(), 1);
        assert!(!backend.is_empty());
    }
}
