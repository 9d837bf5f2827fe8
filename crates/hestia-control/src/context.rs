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

//! Load context observed by the monitoring bridge.

use hestia_core::telemetry::ResourceReport;
use serde::{Deserialize, Serialize};

/// Coarse classification of host resource pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum StressLevel {
    /// Plenty of headroom.
    #[default]
    Nominal,
    /// Pressure is building.
    Elevated,
    /// Load must be shed.
    Severe,
    /// The host is saturated.
    Critical,
}

/// Load thresholds (0.0 to 1.0) separating the stress levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressThresholds {
    pub elevated: f32,
    pub severe: f32,
    pub critical: f32,
}

impl Default for StressThresholds {
    fn default() -> Self {
        Self {
            elevated: 0.75,
            severe: 0.90,
            critical: 0.97,
        }
    }
}

impl StressThresholds {
    /// Classifies a single load value.
    pub fn classify(&self, load: f32) -> StressLevel {
        if load >= self.critical {
            StressLevel::Critical
        } else if load >= self.severe {
            StressLevel::Severe
        } else if load >= self.elevated {
            StressLevel::Elevated
        } else {
            StressLevel::Nominal
        }
    }
}

/// The situational model used by the heuristic engine.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Latest resource report.
    pub resources: ResourceReport,
    /// Stress derived from `resources`.
    pub stress: StressLevel,
    /// Concurrency ceiling in force.
    pub concurrency_ceiling: usize,
    /// Executions holding a slot.
    pub running: usize,
    /// Factor applied to the nominal ceiling under stress.
    ///
    /// | Stress | Multiplier |
    /// |---|---|
    /// | Nominal | 1.0 |
    /// | Elevated | 0.9 |
    /// | Severe | 0.6 |
    /// | Critical | 0.4 |
    pub ceiling_multiplier: f32,
}

impl Default for LoadContext {
    fn default() -> Self {
        Self {
            resources: ResourceReport::default(),
            stress: StressLevel::Nominal,
            concurrency_ceiling: 1,
            running: 0,
            ceiling_multiplier: 1.0,
        }
    }
}

impl LoadContext {
    /// Recomputes `stress` and `ceiling_multiplier` from `resources`.
    pub fn refresh_stress(&mut self, thresholds: &StressThresholds) {
        let cpu = thresholds.classify(self.resources.cpu_load);
        let memory = thresholds.classify(self.resources.memory_load);
        // The more restrictive of the two wins.
        self.stress = cpu.max(memory);
        self.ceiling_multiplier = match self.stress {
            StressLevel::Nominal => 1.0,
            StressLevel::Elevated => 0.9,
            StressLevel::Severe => 0.6,
            StressLevel::Critical => 0.4,
        };
    }

    /// Returns `true` once load must be shed.
    pub fn is_stressed(&self) -> bool {
        self.stress >= StressLevel::Severe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(cpu: f32, memory: f32) -> LoadContext {
        let mut ctx = LoadContext {
            resources: ResourceReport {
                cpu_load: cpu,
                memory_load: memory,
            },
            ..Default::default()
        };
        ctx.refresh_stress(&StressThresholds::default());
        ctx
    }

    #[test]
    fn test_default_context_full_multiplier() {
        let ctx = LoadContext::default();
        assert_eq!(ctx.ceiling_multiplier, 1.0);
        assert!(!ctx.is_stressed());
    }

    #[test]
    fn test_elevated_load() {
        let ctx = context(0.8, 0.1);
        assert_eq!(ctx.stress, StressLevel::Elevated);
        assert!((ctx.ceiling_multiplier - 0.9).abs() < 0.001);
    }

    #[test]
    fn test_memory_pressure_dominates() {
        let ctx = context(0.2, 0.95);
        assert_eq!(ctx.stress, StressLevel::Severe);
        assert!(ctx.is_stressed());
        assert!((ctx.ceiling_multiplier - 0.6).abs() < 0.001);
    }

    #[test]
    fn test_critical_load() {
        let ctx = context(0.99, 0.99);
        assert_eq!(ctx.stress, StressLevel::Critical);
        assert!((ctx.ceiling_multiplier - 0.4).abs() < 0.001);
    }
}
