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

//! The common language of telemetry between the core and its monitoring
//! collaborator.
//!
//! This module defines the events the execution path emits, the samples
//! handed to the metrics exporter, and the intent signals and alerts flowing
//! back. The monitoring bridge in `hestia-control` consumes events and
//! produces signals; `hestia-telemetry` turns samples into exported series.

pub mod event;
pub mod export;
pub mod signal;

pub use self::event::{RejectionReason, ResourceReport, TelemetryEvent};
pub use self::export::{MetricsSample, MetricsSink};
pub use self::signal::{Alert, AlertSeverity, IntentSignal};
