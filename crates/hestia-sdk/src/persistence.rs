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

//! Saving and restoring registry state.

use crossbeam_channel::Receiver;
use hestia_control::{BackgroundTask, FunctionRegistry, SaveRequest, StatisticsAggregator};
use hestia_core::{GlobalCounters, PersistenceError, Snapshot};
use hestia_io::SnapshotStore;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Connects the registry and statistics to a [`SnapshotStore`].
#[derive(Debug)]
pub struct Persister {
    store: Option<SnapshotStore>,
    registry: Arc<FunctionRegistry>,
    stats: Arc<StatisticsAggregator>,
    // Revision and counters at the last successful save.
    saved: Mutex<Option<(u64, GlobalCounters)>>,
}

impl Persister {
    /// `store` is `None` when state is kept in memory only.
    pub fn new(
        store: Option<SnapshotStore>,
        registry: Arc<FunctionRegistry>,
        stats: Arc<StatisticsAggregator>,
    ) -> Self {
        Self {
            store,
            registry,
            stats,
            saved: Mutex::new(None),
        }
    }

    /// The backing store, if any.
    pub fn store(&self) -> Option<&SnapshotStore> {
        self.store.as_ref()
    }

    /// Captures every record, pending restores included, and the counters.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.stats.counters(), self.registry.snapshot_records())
    }

    /// Loads the stored snapshot into the registry and statistics.
    ///
    /// A missing or unreadable file leaves the registry empty; the failure
    /// is logged and never returned. Returns the number of restored records.
    pub fn restore(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let snapshot = store.load_or_default();
        self.stats.restore_counters(snapshot.counters);
        // The document is keyed by id; bodies may omit their own.
        let records = snapshot.functions.into_iter().map(|(id, mut record)| {
            record.id = id;
            record
        });
        let restored = self.registry.restore(records);
        self.mark_saved();
        restored
    }

    /// Saves when state changed since the last save, or always when `force`
    /// is set. Returns `true` if a file was written.
    pub fn save(&self, force: bool) -> Result<bool, PersistenceError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let current = (self.registry.revision(), self.stats.counters());
        if !force && *self.lock() == Some(current) {
            return Ok(false);
        }
        store.save(&self.snapshot())?;
        *self.lock() = Some(current);
        Ok(true)
    }

    /// Saves to an explicit path, independent of the configured store.
    pub fn save_to(&self, store: &SnapshotStore) -> Result<(), PersistenceError> {
        store.save(&self.snapshot())
    }

    /// Starts the autosave worker: saves every `interval` when something
    /// changed, and right away on each request from `requests`.
    pub fn spawn_autosave(
        self: &Arc<Self>,
        interval: Duration,
        requests: Receiver<SaveRequest>,
    ) -> std::io::Result<BackgroundTask> {
        let persister = Arc::clone(self);
        BackgroundTask::spawn("hestia-autosave", move |stop| loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(requests) -> msg => match msg {
                    Ok(request) => {
                        log::debug!("Immediate save requested: {}", request.reason);
                        persister.save_logged(true);
                    }
                    Err(_) => break,
                },
                default(interval) => persister.save_logged(false),
            }
        })
    }

    // Save failures are retried on the next cycle.
    fn save_logged(&self, force: bool) {
        if let Err(err) = self.save(force) {
            log::error!("Snapshot save failed, will retry: {}", err);
        }
    }

    fn mark_saved(&self) {
        *self.lock() = Some((self.registry.revision(), self.stats.counters()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<(u64, GlobalCounters)>> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_control::StatisticsConfig;
    use hestia_core::{CancellationToken, FnCapability, FunctionRecord, FunctionStatus, Payload};
    use std::time::Instant;

    fn fixture(path: Option<std::path::PathBuf>) -> (Arc<FunctionRegistry>, Arc<Persister>) {
        let registry = Arc::new(FunctionRegistry::default());
        let stats = Arc::new(StatisticsAggregator::new(
            StatisticsConfig::default(),
            Arc::clone(&registry),
        ));
        let persister = Persister::new(path.map(SnapshotStore::new), Arc::clone(&registry), stats);
        (registry, Arc::new(persister))
    }

    fn register(registry: &FunctionRegistry, id: &str) {
        registry
            .register(
                FunctionRecord::new(id, id),
                Arc::new(FnCapability::new(|_: &Payload, _: &CancellationToken| {
                    Ok(Payload::Null)
                })),
            )
            .unwrap();
    }

    #[test]
    fn test_save_skips_unchanged_state() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, persister) = fixture(Some(dir.path().join("hestia.json")));
        register(&registry, "geocode");

        assert!(persister.save(false).unwrap());
        assert!(!persister.save(false).unwrap());
        assert!(persister.save(true).unwrap());

        registry.update_status("geocode", FunctionStatus::Disabled).unwrap();
        assert!(persister.save(false).unwrap());
    }

    #[test]
    fn test_memory_only_never_writes() {
        let (registry, persister) = fixture(None);
        register(&registry, "geocode");
        assert!(!persister.save(true).unwrap());
        assert_eq!(persister.restore(), 0);
        assert_eq!(persister.snapshot().len(), 1);
    }

    #[test]
    fn test_restore_queues_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hestia.json");
        {
            let (registry, persister) = fixture(Some(path.clone()));
            register(&registry, "geocode");
            register(&registry, "auth");
            persister.save(true).unwrap();
        }

        let (registry, persister) = fixture(Some(path));
        assert_eq!(persister.restore(), 2);
        assert_eq!(registry.pending_restores().len(), 2);
        // Nothing changed since the load.
        assert!(!persister.save(false).unwrap());
        // Pending restores are carried into the next snapshot.
        assert_eq!(persister.snapshot().len(), 2);
    }

    #[test]
    fn test_autosave_serves_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hestia.json");
        let (registry, persister) = fixture(Some(path.clone()));
        register(&registry, "geocode");

        let (trigger, requests) = hestia_control::SaveTrigger::channel();
        let mut task = persister
            .spawn_autosave(Duration::from_secs(3600), requests)
            .unwrap();
        trigger.request("test");

        let deadline = Instant::now() + Duration::from_secs(2);
        while !path.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        task.stop();
        assert!(path.exists());
    }
}
