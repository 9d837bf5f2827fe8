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

//! Outbound channels from the hot path.
//!
//! Neither side ever blocks the caller: a full or disconnected channel drops
//! the message and logs at trace level.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use hestia_core::telemetry::{Alert, TelemetryEvent};

/// Submits telemetry events to the monitoring bridge.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<TelemetryEvent>>,
}

impl EventSink {
    /// Wraps the sending half of the bridge's event channel.
    pub fn new(tx: Sender<TelemetryEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emits one event. Returns `false` when the event was dropped.
    pub fn emit(&self, event: TelemetryEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::trace!("Telemetry buffer full, dropping {:?}", event);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Raises an alert. Alerts are always logged here as well, so they stay
    /// visible when no bridge is attached.
    pub fn alert(&self, alert: Alert) {
        log::warn!("Alert raised: {}", alert);
        self.emit(TelemetryEvent::Alert(alert));
    }
}

/// Why an immediate snapshot was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    /// Short description of the transition that asked for it.
    pub reason: String,
}

/// Requests an immediate snapshot after a critical transition.
#[derive(Debug, Clone, Default)]
pub struct SaveTrigger {
    tx: Option<Sender<SaveRequest>>,
}

impl SaveTrigger {
    /// Creates a trigger and the receiver the persistence worker listens on.
    ///
    /// The channel holds a single pending request; bursts collapse into one save.
    pub fn channel() -> (Self, Receiver<SaveRequest>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (Self { tx: Some(tx) }, rx)
    }

    /// A trigger that goes nowhere.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Requests a save. Never blocks.
    pub fn request(&self, reason: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let reason = reason.into();
            log::debug!("Snapshot requested: {}", reason);
            let _ = tx.try_send(SaveRequest { reason });
        }
    }
}
