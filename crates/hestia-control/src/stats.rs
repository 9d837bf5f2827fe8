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

//! Statistics aggregation.
//!
//! Completions are folded in the order they are recorded: per-function
//! counters live on the record itself, global counters and short duration
//! windows live here.

use crate::metrics::{Series, SeriesStore};
use crate::registry::FunctionRegistry;
use hestia_core::{
    ErrorKind, ExecutionResult, FunctionFilter, FunctionId, FunctionRecord, FunctionStatus,
    GlobalCounters, RegistryError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Configuration for the [`StatisticsAggregator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Weight of the newest sample in the duration and quality moving averages.
    pub ema_alpha: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self { ema_alpha: 0.2 }
    }
}

/// What a report covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportScope {
    /// Every function plus the global counters.
    Global,
    /// A single function.
    Function(FunctionId),
}

/// Statistics of one function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionReport {
    pub id: FunctionId,
    pub status: FunctionStatus,
    pub execution_count: u64,
    pub failure_count: u64,
    pub failure_rate: f64,
    /// Exponential moving average of durations.
    pub average_duration_ms: f64,
    /// Plain mean over the recent duration window.
    pub recent_duration_ms: f32,
    /// Positive when recent durations are rising.
    pub duration_trend_ms: f32,
    pub quality_score: f64,
    pub wake_count: u64,
    pub last_executed_at: Option<SystemTime>,
    pub sleep_since: Option<SystemTime>,
}

/// Statistics across the whole registry.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalReport {
    pub counters: GlobalCounters,
    pub registered: usize,
    pub by_status: HashMap<FunctionStatus, usize>,
    /// Share of all recorded executions that failed.
    pub failure_rate: f64,
    /// Functions sorted by ascending quality score.
    pub functions: Vec<FunctionReport>,
}

/// A report produced by [`StatisticsAggregator::report`].
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsReport {
    Global(GlobalReport),
    Function(FunctionReport),
}

#[derive(Debug, Default)]
struct StatsInner {
    counters: GlobalCounters,
    windows: SeriesStore,
}

/// Maintains global counters and per-function windows.
#[derive(Debug)]
pub struct StatisticsAggregator {
    config: StatisticsConfig,
    registry: Arc<FunctionRegistry>,
    inner: Mutex<StatsInner>,
}

impl StatisticsAggregator {
    /// Creates an aggregator over `registry`.
    pub fn new(config: StatisticsConfig, registry: Arc<FunctionRegistry>) -> Self {
        Self {
            config,
            registry,
            inner: Mutex::new(StatsInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Folds one completed execution into the function's record and the
    /// global counters. Returns the updated record.
    pub fn record(&self, result: &ExecutionResult) -> Option<FunctionRecord> {
        let mut inner = self.lock();
        let record = self.registry.record_outcome(result, self.config.ema_alpha);
        inner.counters.total_executions += 1;
        if !result.success {
            inner.counters.total_failures += 1;
        }
        if result.error_kind == Some(ErrorKind::TimedOut) {
            inner.counters.total_timeouts += 1;
        }
        inner.windows.push(
            Series::Duration(result.function_id.clone()),
            result.duration.as_secs_f32() * 1000.0,
        );
        record
    }

    /// Counts a rejected request (overload or open circuit).
    pub fn record_rejection(&self) {
        self.lock().counters.total_rejections += 1;
    }

    /// Counts a completed wake.
    pub fn record_wake(&self) {
        self.lock().counters.total_wakes += 1;
    }

    /// Counts a function put to sleep.
    pub fn record_sleep(&self) {
        self.lock().counters.total_sleeps += 1;
    }

    /// Counts a raised alert.
    pub fn record_alert(&self) {
        self.lock().counters.total_alerts += 1;
    }

    /// Current global counters.
    pub fn counters(&self) -> GlobalCounters {
        self.lock().counters
    }

    /// Replaces the global counters, typically from a loaded snapshot.
    pub fn restore_counters(&self, counters: GlobalCounters) {
        self.lock().counters = counters;
    }

    /// Drops the duration window of an unregistered function.
    pub fn forget(&self, id: &FunctionId) {
        self.lock().windows.forget_function(id);
    }

    /// Builds a report for `scope`.
    pub fn report(&self, scope: ReportScope) -> Result<MetricsReport, RegistryError> {
        match scope {
            ReportScope::Global => Ok(MetricsReport::Global(self.global_report())),
            ReportScope::Function(id) => self.function_report(&id).map(MetricsReport::Function),
        }
    }

    /// Statistics of one function.
    pub fn function_report(&self, id: &FunctionId) -> Result<FunctionReport, RegistryError> {
        let record = self.registry.get(id.as_str())?;
        let inner = self.lock();
        Ok(Self::build_function_report(&inner.windows, record))
    }

    /// Statistics across the whole registry.
    pub fn global_report(&self) -> GlobalReport {
        let records: Vec<FunctionRecord> =
            self.registry.list(FunctionFilter::all()).iter().collect();
        let inner = self.lock();

        let mut by_status = HashMap::new();
        for record in &records {
            *by_status.entry(record.status).or_insert(0) += 1;
        }
        let mut functions: Vec<FunctionReport> = records
            .into_iter()
            .map(|r| Self::build_function_report(&inner.windows, r))
            .collect();
        functions.sort_by(|a, b| {
            a.quality_score
                .partial_cmp(&b.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let counters = inner.counters;
        let failure_rate = if counters.total_executions == 0 {
            0.0
        } else {
            counters.total_failures as f64 / counters.total_executions as f64
        };
        GlobalReport {
            counters,
            registered: functions.len(),
            by_status,
            failure_rate,
            functions,
        }
    }

    fn build_function_report(windows: &SeriesStore, record: FunctionRecord) -> FunctionReport {
        let window = Series::Duration(record.id.clone());
        FunctionReport {
            status: record.status,
            execution_count: record.execution_count,
            failure_count: record.failure_count,
            failure_rate: record.failure_rate(),
            average_duration_ms: record.average_duration_ms,
            recent_duration_ms: windows.mean(&window),
            duration_trend_ms: windows.trend(&window),
            quality_score: record.quality_score,
            wake_count: record.wake_count,
            last_executed_at: record.last_executed_at,
            sleep_since: record.sleep_since,
            id: record.id,
        }
    }
}
