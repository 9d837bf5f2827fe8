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

//! The contract every registered implementation satisfies.
//!
//! The registry never inspects an implementation. It only invokes it through
//! [`Capability`], which makes "callable with arguments, returns a result or
//! an error" the single seam between the core and the subsystems it manages.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Opaque argument and output payload.
pub type Payload = serde_json::Value;

/// Error reported by an implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityError {
    /// The invocation failed.
    #[error("{0}")]
    Failed(String),
    /// The arguments were rejected by the implementation.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The implementation observed the cancellation signal and stopped.
    #[error("cancelled")]
    Cancelled,
}

impl CapabilityError {
    /// Convenience constructor for [`CapabilityError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        CapabilityError::Failed(message.into())
    }
}

/// An externally implemented function managed by the registry.
pub trait Capability: Send + Sync {
    /// Invokes the function.
    ///
    /// Long-running implementations should poll `cancel` and return
    /// [`CapabilityError::Cancelled`] once it fires. An implementation that
    /// ignores it is abandoned when its timeout elapses.
    fn invoke(
        &self,
        args: &Payload,
        cancel: &CancellationToken,
    ) -> Result<Payload, CapabilityError>;

    /// Called when the function is woken from sleep. An error moves the
    /// function to `ERROR`.
    fn on_wake(&self) -> Result<(), CapabilityError> {
        Ok(())
    }

    /// Called after the function has been put to sleep.
    fn on_sleep(&self) {}

    /// Idempotent functions may be retried automatically.
    fn is_idempotent(&self) -> bool {
        false
    }
}

/// Adapts a closure into a [`Capability`].
pub struct FnCapability<F> {
    func: F,
    idempotent: bool,
}

impl<F> FnCapability<F>
where
    F: Fn(&Payload, &CancellationToken) -> Result<Payload, CapabilityError> + Send + Sync,
{
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self {
            func,
            idempotent: false,
        }
    }

    /// Marks the wrapped function as safe to retry.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }
}

impl<F> Capability for FnCapability<F>
where
    F: Fn(&Payload, &CancellationToken) -> Result<Payload, CapabilityError> + Send + Sync,
{
    fn invoke(
        &self,
        args: &Payload,
        cancel: &CancellationToken,
    ) -> Result<Payload, CapabilityError> {
        (self.func)(args, cancel)
    }

    fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}

impl<F> fmt::Debug for FnCapability<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCapability")
            .field("idempotent", &self.idempotent)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct TokenInner {
    cancelled: AtomicBool,
    // Dropped on cancel; the disconnection wakes every receiver at once.
    trigger: Mutex<Option<Sender<()>>>,
}

/// Cooperative cancellation signal shared between a caller, the execution
/// coordinator, and the implementation.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
    signal: Receiver<()>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        let (trigger, signal) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
            }),
            signal,
        }
    }

    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// A receiver that becomes disconnected when the token is cancelled.
    ///
    /// Usable in `crossbeam_channel::select!` alongside other channels.
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }

    /// Blocks for up to `timeout`, returning early with `true` if the token
    /// is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        matches!(
            self.signal.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
