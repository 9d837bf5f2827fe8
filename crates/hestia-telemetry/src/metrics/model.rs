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

//! Exported metric values and their identifiers.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Identifies one exported series: a namespace, a name and a label set.
///
/// Ids order by namespace, then name, then labels, so series of the same
/// metric sit next to each other in sorted collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl MetricId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Adds or replaces a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// The series name without labels, `<namespace>_<name>`.
    pub fn family(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }

    /// Returns `true` if both ids name the same metric, whatever their labels.
    pub fn same_family(&self, other: &MetricId) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

/// Renders the id the way it appears in the text exposition:
/// `hestia_executions_total` or `function_failure_rate{function="geocode"}`.
impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.namespace, self.name)?;
        if self.labels.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, (key, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}=\"{}\"", key, escape_label(value))?;
        }
        f.write_str("}")
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Only ever grows, except when the process restarts without a snapshot.
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Counter(v) => v as f64,
            MetricValue::Gauge(v) => v,
        }
    }

    pub fn as_counter(&self) -> Option<u64> {
        match *self {
            MetricValue::Counter(v) => Some(v),
            MetricValue::Gauge(_) => None,
        }
    }

    pub fn as_gauge(&self) -> Option<f64> {
        match *self {
            MetricValue::Gauge(v) => Some(v),
            MetricValue::Counter(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MetricValue::Counter(v) => write!(f, "{v}"),
            MetricValue::Gauge(v) if v.is_nan() => f.write_str("NaN"),
            MetricValue::Gauge(v) if v == f64::INFINITY => f.write_str("+Inf"),
            MetricValue::Gauge(v) if v == f64::NEG_INFINITY => f.write_str("-Inf"),
            MetricValue::Gauge(v) => write!(f, "{v}"),
        }
    }
}

/// One exported series with its help text and unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: MetricId,
    pub help: String,
    /// Unit of the value ("count", "ms", "ratio").
    pub unit: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExportError {
    /// A series cannot change kind once created.
    #[error("metric `{id}` is a {}, not a {}", existing.as_str(), requested.as_str())]
    KindConflict {
        id: MetricId,
        existing: MetricKind,
        requested: MetricKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_ordered_and_rendered() {
        let id = MetricId::new("function", "executions_total")
            .with_label("status", "active")
            .with_label("function", "geocode");
        assert_eq!(id.label("status"), Some("active"));
        assert_eq!(
            id.to_string(),
            "function_executions_total{function=\"geocode\",status=\"active\"}"
        );
        assert_eq!(id.family(), "function_executions_total");
    }

    #[test]
    fn test_label_values_are_escaped() {
        let id = MetricId::new("function", "wakes_total").with_label("function", "a\"b\\c");
        assert_eq!(id.to_string(), "function_wakes_total{function=\"a\\\"b\\\\c\"}");
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(MetricValue::Counter(3).to_string(), "3");
        assert_eq!(MetricValue::Gauge(0.5).to_string(), "0.5");
        assert_eq!(MetricValue::Gauge(f64::NAN).to_string(), "NaN");
        assert_eq!(MetricValue::Gauge(0.5).as_counter(), None);
        assert_eq!(MetricValue::Counter(3).as_f64(), 3.0);
    }
}
