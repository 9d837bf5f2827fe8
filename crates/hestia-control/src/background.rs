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

//! Named background threads with cooperative shutdown.

use crossbeam_channel::{Receiver, Sender};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A background thread stopped by dropping its stop channel.
///
/// The body receives the stop receiver and is expected to `select!` on it;
/// the receiver disconnects when [`stop`](Self::stop) is called or the task
/// is dropped.
#[derive(Debug)]
pub struct BackgroundTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawns `body` on a thread called `name`.
    pub fn spawn<F>(name: &str, body: F) -> io::Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(stop_rx))?;
        log::debug!("Background task '{}' started.", name);
        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Spawns a thread calling `tick` every `interval` until stopped.
    pub fn periodic<F>(name: &str, interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Self::spawn(name, move |stop| loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                default(interval) => tick(),
            }
        })
    }

    /// Name of the thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` until the task has been stopped.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the thread and waits for it to finish. Idempotent.
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Background task '{}' panicked.", self.name);
            } else {
                log::debug!("Background task '{}' stopped.", self.name);
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.stop();
    }
}
