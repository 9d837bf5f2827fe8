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

//! Heuristic analysis for the monitoring bridge.
//!
//! The `HeuristicEngine` evaluates the load context, the rolling windows and
//! the current function records, and proposes intents: a new concurrency
//! ceiling, functions to put to sleep first, and critical functions to wake.
//! It never applies anything itself.

use crate::context::{LoadContext, StressLevel, StressThresholds};
use crate::metrics::{Series, SeriesStore};
use hestia_core::telemetry::{Alert, AlertSeverity, IntentSignal};
use hestia_core::{FunctionId, FunctionRecord, FunctionStatus};
use serde::{Deserialize, Serialize};

/// Tuning for the [`HeuristicEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Load levels separating the stress classes.
    pub stress: StressThresholds,
    /// Failure ratio above which an alert is raised.
    pub failure_ratio_warn: f32,
    /// Average rejections per tick above which the ceiling is raised.
    pub rejection_rate_warn: f32,
    /// Samples a window needs before it is trusted.
    pub min_samples: usize,
    /// Most functions named in one sleep-priority signal.
    pub sleep_batch: usize,
    /// Quality score under which a critical function is reported.
    pub quality_floor: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            stress: StressThresholds::default(),
            failure_ratio_warn: 0.5,
            rejection_rate_warn: 1.0,
            min_samples: 5,
            sleep_batch: 5,
            quality_floor: 0.5,
        }
    }
}

/// An alert tied to the condition that produced it, so that a condition
/// persisting over several ticks is reported once.
#[derive(Debug, Clone)]
pub struct Finding {
    /// Stable key of the condition.
    pub condition: String,
    /// The alert to raise when the condition first appears.
    pub alert: Alert,
}

/// Analysis results produced by the `HeuristicEngine`.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// New global ceiling, when it should change.
    pub suggested_ceiling: Option<usize>,
    /// Idle functions to put to sleep first, most idle first.
    pub sleep_candidates: Vec<FunctionId>,
    /// Sleeping critical functions to wake now.
    pub emergency_wakes: Vec<FunctionId>,
    /// `true` when several pressures coincide and load must be shed hard.
    pub overload_detected: bool,
    /// Conditions worth an alert.
    pub findings: Vec<Finding>,
}

impl AnalysisReport {
    /// The intents this report asks for.
    pub fn signals(&self) -> Vec<IntentSignal> {
        let mut signals = Vec::new();
        if let Some(ceiling) = self.suggested_ceiling {
            signals.push(IntentSignal::AdjustConcurrency { ceiling });
        }
        if !self.sleep_candidates.is_empty() {
            signals.push(IntentSignal::SleepPriority {
                candidates: self.sleep_candidates.clone(),
            });
        }
        for id in &self.emergency_wakes {
            signals.push(IntentSignal::EmergencyWake {
                function_id: id.clone(),
                reason: "system under stress".into(),
            });
        }
        signals
    }
}

/// Derives intents from load and execution statistics.
#[derive(Debug, Clone)]
pub struct HeuristicEngine {
    config: HeuristicConfig,
    nominal_ceiling: usize,
    min_ceiling: usize,
    max_ceiling: usize,
}

impl HeuristicEngine {
    /// Creates an engine. `nominal_ceiling` is the ceiling to return to once
    /// pressure subsides.
    pub fn new(
        config: HeuristicConfig,
        nominal_ceiling: usize,
        min_ceiling: usize,
        max_ceiling: usize,
    ) -> Self {
        let min_ceiling = min_ceiling.max(1);
        let max_ceiling = max_ceiling.max(min_ceiling);
        Self {
            config,
            nominal_ceiling: nominal_ceiling.clamp(min_ceiling, max_ceiling),
            min_ceiling,
            max_ceiling,
        }
    }

    /// Stress thresholds used to classify resource reports.
    pub fn stress_thresholds(&self) -> &StressThresholds {
        &self.config.stress
    }

    /// Analyzes the current situational model.
    ///
    /// 1. **Resource stress**: shrink the ceiling and name sleep candidates.
    /// 2. **Rejections**: grow the ceiling while the host has headroom.
    /// 3. **Failure ratio**: report sustained failures.
    /// 4. **Critical health**: report degraded critical functions.
    /// 5. **Overload**: coinciding pressures floor the ceiling.
    pub fn analyze(
        &self,
        context: &LoadContext,
        store: &SeriesStore,
        functions: &[FunctionRecord],
    ) -> AnalysisReport {
        let mut report = AnalysisReport::default();
        let mut pressure_count: u32 = 0;
        let current = context.concurrency_ceiling;
        let mut target = current;

        // ── 1. Resource Stress ───────────────────────────────────────────
        let stressed_target = ((self.nominal_ceiling as f32 * context.ceiling_multiplier) as usize)
            .clamp(self.min_ceiling, self.max_ceiling);
        match context.stress {
            StressLevel::Critical | StressLevel::Severe => {
                let severity = if context.stress == StressLevel::Critical {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                };
                log::warn!(
                    "Heuristic: {:?} load (cpu={:.2}, mem={:.2}), shedding.",
                    context.stress,
                    context.resources.cpu_load,
                    context.resources.memory_load
                );
                target = target.min(stressed_target);
                report.findings.push(Finding {
                    condition: "resource_stress".into(),
                    alert: Alert::system(
                        severity,
                        format!(
                            "resource stress: cpu {:.0}%, memory {:.0}%",
                            context.resources.cpu_load * 100.0,
                            context.resources.memory_load * 100.0
                        ),
                    ),
                });
                report.sleep_candidates = self.sleep_candidates(functions);
                report.emergency_wakes = functions
                    .iter()
                    .filter(|r| {
                        r.status == FunctionStatus::Sleeping
                            && r.is_critical
                            && r.emergency_wake_eligible
                    })
                    .map(|r| r.id.clone())
                    .collect();
                pressure_count += 1;
            }
            StressLevel::Elevated => {
                log::debug!("Heuristic: elevated load, holding the ceiling.");
            }
            StressLevel::Nominal => {
                if target < self.nominal_ceiling {
                    target = self.nominal_ceiling;
                }
            }
        }

        // ── 2. Rejections ────────────────────────────────────────────────
        if store.samples(&Series::Rejections) >= self.config.min_samples {
            let rate = store.mean(&Series::Rejections);
            if rate > self.config.rejection_rate_warn {
                if context.stress == StressLevel::Nominal {
                    let step = (current / 4).max(1);
                    target = target.max((current + step).min(self.max_ceiling));
                    log::info!(
                        "Heuristic: {:.2} rejections per tick with headroom, raising ceiling.",
                        rate
                    );
                } else {
                    pressure_count += 1;
                }
                report.findings.push(Finding {
                    condition: "rejections".into(),
                    alert: Alert::system(
                        AlertSeverity::Info,
                        format!("{:.1} requests rejected per tick", rate),
                    ),
                });
            }
        }

        // ── 3. Failure Ratio ─────────────────────────────────────────────
        if store.samples(&Series::FailureRatio) >= self.config.min_samples {
            let ratio = store.mean(&Series::FailureRatio);
            if ratio > self.config.failure_ratio_warn {
                log::warn!("Heuristic: failure ratio {:.2} over the window.", ratio);
                report.findings.push(Finding {
                    condition: "failure_ratio".into(),
                    alert: Alert::system(
                        AlertSeverity::Warning,
                        format!("{:.0}% of executions failing", ratio * 100.0),
                    ),
                });
                pressure_count += 1;
            }
        }

        // ── 4. Critical Health ───────────────────────────────────────────
        for record in functions.iter().filter(|r| r.is_critical) {
            let trusted = record.execution_count >= self.config.min_samples as u64;
            if trusted && record.quality_score < self.config.quality_floor {
                report.findings.push(Finding {
                    condition: format!("quality:{}", record.id),
                    alert: Alert::for_function(
                        record.id.clone(),
                        AlertSeverity::Critical,
                        format!("quality score {:.2}", record.quality_score),
                    ),
                });
                pressure_count += 1;
            }
        }

        // ── 5. Overload ──────────────────────────────────────────────────
        if pressure_count >= 3 || context.stress == StressLevel::Critical {
            report.overload_detected = true;
            target = self.min_ceiling;
            log::error!(
                "Heuristic: OVERLOAD ({} pressures), flooring the ceiling to {}.",
                pressure_count,
                self.min_ceiling
            );
            report.findings.push(Finding {
                condition: "overload".into(),
                alert: Alert::system(
                    AlertSeverity::Critical,
                    format!("overload: {} simultaneous pressures", pressure_count),
                ),
            });
        }

        if target != current {
            report.suggested_ceiling = Some(target);
        }
        report
    }

    /// Active, non-critical functions ordered from least to most recently used.
    fn sleep_candidates(&self, functions: &[FunctionRecord]) -> Vec<FunctionId> {
        let mut idle: Vec<&FunctionRecord> = functions
            .iter()
            .filter(|r| r.status == FunctionStatus::Active && !r.is_critical)
            .collect();
        idle.sort_by(|a, b| {
            a.last_executed_at
                .cmp(&b.last_executed_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        idle.into_iter()
            .take(self.config.sleep_batch)
            .map(|r| r.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_core::telemetry::ResourceReport;
    use std::time::{Duration, SystemTime};

    fn seed(store: &mut SeriesStore, series: Series, value: f32, samples: usize) {
        for _ in 0..samples {
            store.push(series.clone(), value);
        }
    }

    fn engine() -> HeuristicEngine {
        HeuristicEngine::new(HeuristicConfig::default(), 8, 1, 16)
    }

    fn context(cpu: f32, memory: f32, ceiling: usize) -> LoadContext {
        let mut ctx = LoadContext {
            resources: ResourceReport {
                cpu_load: cpu,
                memory_load: memory,
            },
            concurrency_ceiling: ceiling,
            ..Default::default()
        };
        ctx.refresh_stress(&StressThresholds::default());
        ctx
    }

    fn active(id: &str, last_used_secs: u64) -> FunctionRecord {
        let mut record = FunctionRecord::new(id, id);
        record.status = FunctionStatus::Active;
        record.last_executed_at =
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(last_used_secs));
        record
    }

    #[test]
    fn test_nominal_load_no_signals() {
        let report = engine().analyze(&context(0.2, 0.3, 8), &SeriesStore::new(), &[]);
        assert!(report.signals().is_empty());
        assert!(!report.overload_detected);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_severe_stress_sheds_load() {
        let mut sleeping_critical = FunctionRecord::new("auth", "Auth").critical(true);
        sleeping_critical.status = FunctionStatus::Sleeping;
        let functions = vec![
            active("recent", 500),
            active("stale", 10),
            active("vital", 1).critical(true),
            sleeping_critical,
        ];

        let report = engine().analyze(&context(0.93, 0.2, 8), &SeriesStore::new(), &functions);
        assert_eq!(report.suggested_ceiling, Some(4));
        assert_eq!(
            report.sleep_candidates,
            vec![FunctionId::new("stale"), FunctionId::new("recent")]
        );
        assert_eq!(report.emergency_wakes, vec![FunctionId::new("auth")]);
        assert_eq!(report.findings[0].condition, "resource_stress");
        assert!(!report.overload_detected);
    }

    #[test]
    fn test_critical_stress_floors_ceiling() {
        let report = engine().analyze(&context(0.99, 0.2, 8), &SeriesStore::new(), &[]);
        assert!(report.overload_detected);
        assert_eq!(report.suggested_ceiling, Some(1));
    }

    #[test]
    fn test_rejections_raise_ceiling_with_headroom() {
        let mut store = SeriesStore::new();
        seed(&mut store, Series::Rejections, 3.0, 10);
        let report = engine().analyze(&context(0.1, 0.1, 8), &store, &[]);
        assert_eq!(report.suggested_ceiling, Some(10));
    }

    #[test]
    fn test_recovers_to_nominal_ceiling() {
        let report = engine().analyze(&context(0.1, 0.1, 3), &SeriesStore::new(), &[]);
        assert_eq!(report.suggested_ceiling, Some(8));
    }

    #[test]
    fn test_failure_ratio_alert() {
        let mut store = SeriesStore::new();
        seed(&mut store, Series::FailureRatio, 0.8, 10);
        let report = engine().analyze(&context(0.1, 0.1, 8), &store, &[]);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].alert.severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_coinciding_pressures_trigger_overload() {
        let mut store = SeriesStore::new();
        seed(&mut store, Series::FailureRatio, 0.9, 10);
        seed(&mut store, Series::Rejections, 5.0, 10);
        let report = engine().analyze(&context(0.92, 0.1, 8), &store, &[]);
        assert!(report.overload_detected);
        assert_eq!(report.suggested_ceiling, Some(1));
    }

    #[test]
    fn test_degraded_critical_function_reported() {
        let mut record = active("auth", 1).critical(true);
        record.execution_count = 20;
        record.failure_count = 15;
        record.quality_score = 0.2;
        let report = engine().analyze(&context(0.1, 0.1, 8), &SeriesStore::new(), &[record]);
        assert_eq!(report.findings[0].condition, "quality:auth");
        assert_eq!(report.findings[0].alert.severity, AlertSeverity::Critical);
    }
}
