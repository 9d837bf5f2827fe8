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

//! # Hestia Control
//!
//! The runtime of the function manager. The hot path (registry, circuit
//! breaker, concurrency gate, executor) serves invocations; the cold path
//! (monitoring bridge, heuristics, lifecycle evaluator) observes telemetry
//! and steers the hot path through intent signals.

pub mod analysis;
pub mod applier;
pub mod background;
pub mod bridge;
pub mod circuit;
pub mod context;
pub mod executor;
pub mod gate;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod sink;
pub mod stats;

pub use analysis::{AnalysisReport, Finding, HeuristicConfig, HeuristicEngine};
pub use applier::SignalApplier;
pub use background::BackgroundTask;
pub use bridge::{BridgeConfig, MonitoringBridge};
pub use circuit::{CircuitBreaker, CircuitBreakerConfig};
pub use context::{LoadContext, StressLevel, StressThresholds};
pub use executor::{ExecutionConfig, ExecutionCoordinator, RetryPolicy};
pub use gate::{ConcurrencyGate, OverflowPolicy, SlotGuard, SlotRefused};
pub use metrics::{SampleWindow, Series, SeriesStore};
pub use lifecycle::{LifecycleConfig, LifecycleController, SleepEvaluation, WakeReason};
pub use registry::{FunctionListing, FunctionRegistry, ListingIter, RegistryConfig};
pub use sink::{EventSink, SaveRequest, SaveTrigger};
pub use stats::{
    FunctionReport, GlobalReport, MetricsReport, ReportScope, StatisticsAggregator,
    StatisticsConfig,
};
