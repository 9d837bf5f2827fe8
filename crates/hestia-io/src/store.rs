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

//! A file-backed snapshot store.
//!
//! Snapshots are JSON documents. Saves go through a temporary file in the
//! same directory that is synced and then renamed over the target, so a
//! crash leaves either the previous snapshot or the new one on disk.

use hestia_core::snapshot::SNAPSHOT_FORMAT_MAJOR;
use hestia_core::{PersistenceError, Snapshot, SnapshotVersion};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Reads and writes snapshots at a fixed path.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    // Serializes writers sharing the temporary file.
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `snapshot` atomically, creating parent directories as needed.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let tmp = self.temp_path();
        let written = File::create(&tmp).and_then(|file| {
            let mut writer = BufWriter::new(file);
            writer.write_all(&bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(io_error(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_error(&self.path, e));
        }

        log::debug!(
            "Snapshot of {} function(s) saved to {}.",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Reads the snapshot.
    ///
    /// Unknown fields are ignored and missing ones take their defaults, so
    /// any minor version of the current major is accepted.
    pub fn load(&self) -> Result<Snapshot, PersistenceError> {
        let bytes = fs::read(&self.path).map_err(|e| io_error(&self.path, e))?;
        self.decode(&bytes)
    }

    /// Reads the snapshot, falling back to an empty one when the file is
    /// missing or unreadable. A file that cannot be decoded is moved aside
    /// so the next save does not destroy it.
    pub fn load_or_default(&self) -> Snapshot {
        match self.load() {
            Ok(snapshot) => {
                log::info!(
                    "Loaded snapshot {} with {} function(s) from {}.",
                    snapshot.version,
                    snapshot.len(),
                    self.path.display()
                );
                snapshot
            }
            Err(err) if err.is_missing() => {
                log::info!("No snapshot at {}, starting empty.", self.path.display());
                Snapshot::default()
            }
            Err(err) => {
                log::warn!("Starting with an empty registry: {}", err);
                if matches!(
                    err,
                    PersistenceError::Corrupt { .. } | PersistenceError::UnsupportedVersion { .. }
                ) {
                    self.quarantine();
                }
                Snapshot::default()
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Snapshot, PersistenceError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| self.corrupt(e))?;
        let version = match value.get("version") {
            Some(v) => serde_json::from_value::<SnapshotVersion>(v.clone())
                .map_err(|e| self.corrupt(e))?,
            None => SnapshotVersion::default(),
        };
        if !version.is_supported() {
            return Err(PersistenceError::UnsupportedVersion {
                found: version.to_string(),
                supported: SNAPSHOT_FORMAT_MAJOR,
            });
        }
        serde_json::from_value(value).map_err(|e| self.corrupt(e))
    }

    fn corrupt(&self, err: serde_json::Error) -> PersistenceError {
        PersistenceError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn quarantine(&self) {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{secs}"));
        let target = self.path.with_file_name(name);
        match fs::rename(&self.path, &target) {
            Ok(()) => log::warn!("Unreadable snapshot moved to {}.", target.display()),
            Err(e) => log::error!(
                "Failed to move unreadable snapshot {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}
