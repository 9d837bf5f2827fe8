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

//! The authoritative store of function records and their implementations.
//!
//! Every record lives behind one coarse lock together with the bookkeeping
//! the execution path needs (in-flight count, last activity, pending sleep).
//! All status changes go through [`FunctionStatus::can_transition_to`].

use hestia_core::{
    Capability, ExecutionError, ExecutionResult, FunctionFilter, FunctionId, FunctionRecord,
    FunctionStatus, RegistryError, SecurityLevel,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

/// Configuration for the [`FunctionRegistry`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// When `true`, registering an id that already exists replaces its
    /// metadata and implementation instead of failing with `DuplicateId`.
    pub allow_replace: bool,
}

struct Entry {
    record: FunctionRecord,
    capability: Arc<dyn Capability>,
    in_flight: usize,
    last_activity: Instant,
    pending_sleep_since: Option<Instant>,
    asleep_at: Option<Instant>,
    waking: bool,
}

impl Entry {
    fn new(record: FunctionRecord, capability: Arc<dyn Capability>) -> Self {
        let asleep_at = (record.status == FunctionStatus::Sleeping).then(Instant::now);
        Self {
            record,
            capability,
            in_flight: 0,
            last_activity: Instant::now(),
            pending_sleep_since: None,
            asleep_at,
            waking: false,
        }
    }

    fn transition(&mut self, to: FunctionStatus) -> Result<FunctionStatus, RegistryError> {
        let from = self.record.status;
        if !from.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition {
                id: self.record.id.clone(),
                from,
                to,
            });
        }
        self.record.status = to;
        self.pending_sleep_since = None;
        if to == FunctionStatus::Sleeping {
            self.record.sleep_since = Some(SystemTime::now());
            self.asleep_at = Some(Instant::now());
        } else if from == FunctionStatus::Sleeping {
            self.record.sleep_since = None;
            self.asleep_at = None;
        }
        if from != to {
            log::debug!("Function '{}': {} -> {}", self.record.id, from, to);
        }
        Ok(from)
    }
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<FunctionId, Entry>,
    // Records loaded from a snapshot whose implementation is not registered yet.
    restored: HashMap<FunctionId, FunctionRecord>,
    revision: u64,
}

impl RegistryInner {
    fn entry_mut(&mut self, id: &str) -> Result<&mut Entry, RegistryError> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(FunctionId::new(id)))
    }
}

/// Result of admitting one invocation.
pub(crate) enum Admission {
    /// The function is dispatchable; `in_flight` was incremented.
    Ready {
        capability: Arc<dyn Capability>,
        is_critical: bool,
    },
    /// The function must be woken first.
    Asleep,
}

/// Result of claiming the right to wake a function.
pub(crate) enum WakeTicket {
    /// Nothing to do; the function is already awake.
    AlreadyAwake(FunctionRecord),
    /// The caller owns the wake and must call `finish_wake`.
    Proceed {
        capability: Arc<dyn Capability>,
        is_critical: bool,
    },
}

/// Outcome of one idle sweep.
#[derive(Default)]
pub(crate) struct IdleSweep {
    pub slept: Vec<(FunctionId, Arc<dyn Capability>)>,
    pub pending: Vec<FunctionId>,
    pub due_for_wake: Vec<FunctionId>,
}

/// The function registry.
///
/// Implementations are held by reference next to their records and are
/// never serialized.
pub struct FunctionRegistry {
    config: RegistryConfig,
    inner: Mutex<RegistryInner>,
    wake_done: Condvar,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("FunctionRegistry")
            .field("functions", &inner.entries.len())
            .field("restored", &inner.restored.len())
            .field("revision", &inner.revision)
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(RegistryInner::default()),
            wake_done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a function and its implementation.
    ///
    /// A new function starts `REGISTERED` and moves to `ACTIVE` right away
    /// when `auto_enable` is set. If a snapshot record with the same id was
    /// restored earlier, its persisted state is merged in.
    pub fn register(
        &self,
        record: FunctionRecord,
        capability: Arc<dyn Capability>,
    ) -> Result<FunctionRecord, RegistryError> {
        self.insert(record, capability, self.config.allow_replace)
    }

    /// Registers a function, replacing any existing registration with the
    /// same id regardless of [`RegistryConfig::allow_replace`].
    ///
    /// A replacement keeps the status and counters of the old entry and is
    /// rejected with `InUse` while executions are in flight.
    pub fn register_or_replace(
        &self,
        record: FunctionRecord,
        capability: Arc<dyn Capability>,
    ) -> Result<FunctionRecord, RegistryError> {
        self.insert(record, capability, true)
    }

    fn insert(
        &self,
        mut record: FunctionRecord,
        capability: Arc<dyn Capability>,
        replace: bool,
    ) -> Result<FunctionRecord, RegistryError> {
        record.validate()?;
        let mut inner = self.lock();
        let id = record.id.clone();

        if let Some(entry) = inner.entries.get_mut(&id) {
            if !replace {
                return Err(RegistryError::DuplicateId(id));
            }
            if entry.in_flight > 0 || entry.waking {
                return Err(RegistryError::InUse {
                    id,
                    in_flight: entry.in_flight,
                });
            }
            let old = &entry.record;
            record.status = old.status;
            record.created_at = old.created_at;
            record.last_executed_at = old.last_executed_at;
            record.sleep_since = old.sleep_since;
            record.wake_count = old.wake_count;
            record.execution_count = old.execution_count;
            record.failure_count = old.failure_count;
            record.average_duration_ms = old.average_duration_ms;
            record.quality_score = old.quality_score;
            entry.record = record;
            entry.capability = capability;
            let snapshot = entry.record.clone();
            inner.revision += 1;
            log::info!("Function '{}' replaced.", id);
            return Ok(snapshot);
        }

        match inner.restored.remove(&id) {
            Some(persisted) => {
                merge_persisted(&mut record, persisted);
                log::info!(
                    "Function '{}' registered with restored state ({}).",
                    id,
                    record.status
                );
            }
            None => {
                record.status = if record.auto_enable {
                    FunctionStatus::Active
                } else {
                    FunctionStatus::Registered
                };
                record.sleep_since = None;
                log::info!("Function '{}' registered ({}).", id, record.status);
            }
        }

        let snapshot = record.clone();
        inner.entries.insert(id, Entry::new(record, capability));
        inner.revision += 1;
        Ok(snapshot)
    }

    /// Removes a function. Rejected with `InUse` while executions are in flight.
    pub fn unregister(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        let mut inner = self.lock();
        let entry = inner.entry_mut(id)?;
        if entry.in_flight > 0 || entry.waking {
            return Err(RegistryError::InUse {
                id: entry.record.id.clone(),
                in_flight: entry.in_flight,
            });
        }
        let removed = inner
            .entries
            .remove(id)
            .map(|e| e.record)
            .ok_or_else(|| RegistryError::NotFound(FunctionId::new(id)))?;
        inner.revision += 1;
        log::info!("Function '{}' unregistered.", id);
        Ok(removed)
    }

    /// Returns a copy of the current record.
    pub fn get(&self, id: &str) -> Result<FunctionRecord, RegistryError> {
        self.lock()
            .entries
            .get(id)
            .map(|e| e.record.clone())
            .ok_or_else(|| RegistryError::NotFound(FunctionId::new(id)))
    }

    /// Returns `true` if a function with this id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().entries.contains_key(id)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if no function is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lists the functions matching `filter`.
    ///
    /// The set of ids is captured now; each record is read when the listing
    /// is iterated, so iteration reflects the state at that moment. Functions
    /// that were unregistered or stopped matching in between are skipped.
    pub fn list(&self, filter: FunctionFilter) -> FunctionListing<'_> {
        let mut ids: Vec<FunctionId> = self
            .lock()
            .entries
            .values()
            .filter(|e| filter.matches(&e.record))
            .map(|e| e.record.id.clone())
            .collect();
        ids.sort();
        FunctionListing {
            registry: self,
            filter,
            ids,
        }
    }

    /// Moves a function to `to` through the state machine and returns the
    /// previous status.
    ///
    /// `RUNNING` is owned by the execution path: it can be neither entered
    /// nor left back to `ACTIVE` from here.
    pub fn update_status(
        &self,
        id: &str,
        to: FunctionStatus,
    ) -> Result<FunctionStatus, RegistryError> {
        let mut inner = self.lock();
        let entry = inner.entry_mut(id)?;
        let from = entry.record.status;
        if to == FunctionStatus::Running
            || (from == FunctionStatus::Running && to == FunctionStatus::Active)
        {
            return Err(RegistryError::InvalidTransition {
                id: entry.record.id.clone(),
                from,
                to,
            });
        }
        entry.transition(to)?;
        if to == FunctionStatus::Active {
            entry.last_activity = Instant::now();
        }
        inner.revision += 1;
        Ok(from)
    }

    /// Marks or unmarks a function as critical.
    pub fn set_critical(&self, id: &str, critical: bool) -> Result<FunctionRecord, RegistryError> {
        let mut inner = self.lock();
        let entry = inner.entry_mut(id)?;
        entry.record.is_critical = critical;
        if critical {
            entry.record.emergency_wake_eligible = true;
            entry.pending_sleep_since = None;
        }
        let record = entry.record.clone();
        inner.revision += 1;
        Ok(record)
    }

    /// Changes the security level of a function.
    pub fn set_security_level(
        &self,
        id: &str,
        level: SecurityLevel,
    ) -> Result<FunctionRecord, RegistryError> {
        let mut inner = self.lock();
        let entry = inner.entry_mut(id)?;
        entry.record.security_level = level;
        let record = entry.record.clone();
        inner.revision += 1;
        Ok(record)
    }

    /// Number of executions currently in flight for `id`.
    pub fn in_flight(&self, id: &str) -> Result<usize, RegistryError> {
        self.lock()
            .entries
            .get(id)
            .map(|e| e.in_flight)
            .ok_or_else(|| RegistryError::NotFound(FunctionId::new(id)))
    }

    /// Returns the implementation registered for `id`.
    pub fn capability(&self, id: &str) -> Result<Arc<dyn Capability>, RegistryError> {
        self.lock()
            .entries
            .get(id)
            .map(|e| Arc::clone(&e.capability))
            .ok_or_else(|| RegistryError::NotFound(FunctionId::new(id)))
    }

    /// Queues snapshot records to be merged when their implementation is
    /// registered. Returns how many were queued.
    ///
    /// Records for ids that are already registered are skipped: live state wins.
    pub fn restore(&self, records: impl IntoIterator<Item = FunctionRecord>) -> usize {
        let mut inner = self.lock();
        let mut queued = 0;
        for record in records {
            if let Err(err) = record.validate_restored() {
                log::warn!("Skipping restored record: {}", err);
                continue;
            }
            if inner.entries.contains_key(&record.id) {
                log::debug!("Function '{}' already registered, restored state ignored.", record.id);
                continue;
            }
            inner.restored.insert(record.id.clone(), record);
            queued += 1;
        }
        if queued > 0 {
            log::info!("{} function record(s) restored, awaiting registration.", queued);
        }
        queued
    }

    /// Ids of restored records still waiting for their implementation.
    pub fn pending_restores(&self) -> Vec<FunctionId> {
        let mut ids: Vec<_> = self.lock().restored.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Copies of every record, including restored ones not yet registered,
    /// ordered by id.
    pub fn snapshot_records(&self) -> Vec<FunctionRecord> {
        let inner = self.lock();
        let mut records: Vec<FunctionRecord> = inner
            .entries
            .values()
            .map(|e| e.record.clone())
            .chain(inner.restored.values().cloned())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// A counter bumped on every mutation. Equal values mean nothing changed.
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    // ── Execution path ───────────────────────────────────────────────────

    /// Admits one invocation: checks status and the per-function limit, then
    /// counts it in flight and moves `ACTIVE` to `RUNNING`.
    pub(crate) fn begin_execution(
        &self,
        id: &str,
        default_limit: Option<usize>,
    ) -> Result<Admission, ExecutionError> {
        let mut inner = self.lock();
        let entry = inner
            .entries
            .get_mut(id)
            .ok_or_else(|| ExecutionError::NotFound(FunctionId::new(id)))?;
        let fid = || entry.record.id.clone();
        match entry.record.status {
            FunctionStatus::Registered => return Err(ExecutionError::NotEnabled(fid())),
            FunctionStatus::Disabled => return Err(ExecutionError::Disabled(fid())),
            FunctionStatus::Error => return Err(ExecutionError::ErrorState(fid())),
            FunctionStatus::Sleeping => return Ok(Admission::Asleep),
            FunctionStatus::Active | FunctionStatus::Running => {}
        }
        if let Some(limit) = entry.record.max_concurrency.or(default_limit) {
            if entry.in_flight >= limit {
                return Err(ExecutionError::Overloaded { id: fid(), limit });
            }
        }
        if entry.record.status == FunctionStatus::Active {
            entry.transition(FunctionStatus::Running)?;
        }
        entry.in_flight += 1;
        entry.last_activity = Instant::now();
        entry.pending_sleep_since = None;
        let admission = Admission::Ready {
            capability: Arc::clone(&entry.capability),
            is_critical: entry.record.is_critical,
        };
        inner.revision += 1;
        Ok(admission)
    }

    /// Counts one invocation out. The last one out moves `RUNNING` back to
    /// `ACTIVE`; a `DISABLED` or `ERROR` status set meanwhile is left alone.
    pub(crate) fn end_execution(&self, id: &str) {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(id) else {
            return;
        };
        entry.in_flight = entry.in_flight.saturating_sub(1);
        entry.last_activity = Instant::now();
        if entry.in_flight == 0 && entry.record.status == FunctionStatus::Running {
            let _ = entry.transition(FunctionStatus::Active);
        }
        inner.revision += 1;
    }

    /// Folds one completed execution into the function's counters.
    pub(crate) fn record_outcome(
        &self,
        result: &ExecutionResult,
        alpha: f64,
    ) -> Option<FunctionRecord> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(&result.function_id)?;
        let record = &mut entry.record;
        let duration_ms = result.duration.as_secs_f64() * 1000.0;
        let success = if result.success { 1.0 } else { 0.0 };

        record.execution_count += 1;
        if !result.success {
            record.failure_count += 1;
        }
        if record.execution_count == 1 {
            record.average_duration_ms = duration_ms;
        } else {
            record.average_duration_ms =
                alpha * duration_ms + (1.0 - alpha) * record.average_duration_ms;
        }
        record.quality_score = alpha * success + (1.0 - alpha) * record.quality_score;
        record.last_executed_at = Some(result.completed_at);

        let snapshot = record.clone();
        inner.revision += 1;
        Some(snapshot)
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Walks every idle function, starting grace periods for those past
    /// their idle threshold and putting to sleep those whose grace period
    /// elapsed. Critical functions and functions with work in flight are
    /// never put to sleep here.
    pub(crate) fn sweep_idle(
        &self,
        now: Instant,
        idle_threshold: impl Fn(&FunctionRecord) -> Duration,
        grace: Duration,
        max_sleep: Option<Duration>,
    ) -> IdleSweep {
        let mut inner = self.lock();
        let mut sweep = IdleSweep::default();
        let mut changed = false;

        for entry in inner.entries.values_mut() {
            match entry.record.status {
                FunctionStatus::Active => {
                    if entry.record.is_critical || entry.in_flight > 0 {
                        entry.pending_sleep_since = None;
                        continue;
                    }
                    let idle = now.saturating_duration_since(entry.last_activity);
                    if entry.pending_sleep_since.is_none() && idle >= idle_threshold(&entry.record)
                    {
                        entry.pending_sleep_since = Some(now);
                    }
                    let Some(since) = entry.pending_sleep_since else {
                        continue;
                    };
                    if now.saturating_duration_since(since) >= grace {
                        if entry.transition(FunctionStatus::Sleeping).is_ok() {
                            sweep
                                .slept
                                .push((entry.record.id.clone(), Arc::clone(&entry.capability)));
                            changed = true;
                        }
                    } else {
                        sweep.pending.push(entry.record.id.clone());
                    }
                }
                FunctionStatus::Sleeping => {
                    if let (Some(max), Some(at)) = (max_sleep, entry.asleep_at) {
                        if !entry.waking && now.saturating_duration_since(at) >= max {
                            sweep.due_for_wake.push(entry.record.id.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        if changed {
            inner.revision += 1;
        }
        sweep.slept.sort_by(|a, b| a.0.cmp(&b.0));
        sweep.pending.sort();
        sweep.due_for_wake.sort();
        sweep
    }

    /// Starts the grace period right away for the given idle, non-critical
    /// functions. Returns how many were affected.
    pub(crate) fn prioritize_sleep(&self, ids: &[FunctionId]) -> usize {
        let mut inner = self.lock();
        let now = Instant::now();
        let mut count = 0;
        for id in ids {
            if let Some(entry) = inner.entries.get_mut(id) {
                let eligible = entry.record.status == FunctionStatus::Active
                    && !entry.record.is_critical
                    && entry.in_flight == 0;
                if eligible && entry.pending_sleep_since.is_none() {
                    entry.pending_sleep_since = Some(now);
                    count += 1;
                }
            }
        }
        count
    }

    /// Moves an idle `ACTIVE` function to `SLEEPING` right now.
    pub(crate) fn sleep_now(
        &self,
        id: &str,
    ) -> Result<(FunctionRecord, Arc<dyn Capability>), RegistryError> {
        let mut inner = self.lock();
        let entry = inner.entry_mut(id)?;
        if entry.waking {
            return Err(RegistryError::InUse {
                id: entry.record.id.clone(),
                in_flight: entry.in_flight,
            });
        }
        entry.transition(FunctionStatus::Sleeping)?;
        let out = (entry.record.clone(), Arc::clone(&entry.capability));
        inner.revision += 1;
        Ok(out)
    }

    /// Claims the wake of a sleeping function. Concurrent callers wait for
    /// the wake in progress and then observe its outcome.
    pub(crate) fn begin_wake(
        &self,
        id: &str,
        emergency: bool,
    ) -> Result<WakeTicket, RegistryError> {
        let mut inner = self.lock();
        loop {
            let waking = inner
                .entries
                .get(id)
                .map(|e| e.waking)
                .ok_or_else(|| RegistryError::NotFound(FunctionId::new(id)))?;
            if !waking {
                break;
            }
            inner = self
                .wake_done
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let entry = inner.entry_mut(id)?;
        if emergency && !entry.record.emergency_wake_eligible {
            return Err(RegistryError::NotEmergencyEligible(entry.record.id.clone()));
        }
        match entry.record.status {
            FunctionStatus::Active | FunctionStatus::Running => {
                Ok(WakeTicket::AlreadyAwake(entry.record.clone()))
            }
            FunctionStatus::Sleeping => {
                entry.waking = true;
                Ok(WakeTicket::Proceed {
                    capability: Arc::clone(&entry.capability),
                    is_critical: entry.record.is_critical,
                })
            }
            from => Err(RegistryError::InvalidTransition {
                id: entry.record.id.clone(),
                from,
                to: FunctionStatus::Active,
            }),
        }
    }

    /// Completes a wake claimed with `begin_wake`. A failed wake moves the
    /// function to `ERROR`.
    pub(crate) fn finish_wake(
        &self,
        id: &str,
        outcome: Result<(), String>,
    ) -> Result<FunctionRecord, RegistryError> {
        let mut inner = self.lock();
        let result = match inner.entry_mut(id) {
            Ok(entry) => {
                entry.waking = false;
                match outcome {
                    Ok(()) => entry.transition(FunctionStatus::Active).map(|_| {
                        entry.record.wake_count += 1;
                        entry.last_activity = Instant::now();
                        entry.record.clone()
                    }),
                    Err(reason) => {
                        let _ = entry.transition(FunctionStatus::Error);
                        Err(RegistryError::WakeFailed {
                            id: entry.record.id.clone(),
                            reason,
                        })
                    }
                }
            }
            Err(err) => Err(err),
        };
        inner.revision += 1;
        drop(inner);
        self.wake_done.notify_all();
        result
    }
}

/// Overlays the persisted lifecycle state and counters of a restored record
/// onto a freshly registered one.
fn merge_persisted(record: &mut FunctionRecord, persisted: FunctionRecord) {
    record.status = match persisted.status {
        // Nothing survives a restart in flight.
        FunctionStatus::Running => FunctionStatus::Active,
        FunctionStatus::Registered if record.auto_enable => FunctionStatus::Active,
        other => other,
    };
    record.sleep_since = if record.status == FunctionStatus::Sleeping {
        persisted.sleep_since.or_else(|| Some(SystemTime::now()))
    } else {
        None
    };
    record.is_critical = persisted.is_critical;
    record.emergency_wake_eligible |= persisted.is_critical;
    record.security_level = persisted.security_level;
    if persisted.created_at != SystemTime::UNIX_EPOCH {
        record.created_at = persisted.created_at;
    }
    record.last_executed_at = persisted.last_executed_at;
    record.wake_count = persisted.wake_count;
    record.execution_count = persisted.execution_count;
    record.failure_count = persisted.failure_count;
    record.average_duration_ms = persisted.average_duration_ms;
    record.quality_score = persisted.quality_score;
}

/// A lazy, restartable listing produced by [`FunctionRegistry::list`].
pub struct FunctionListing<'a> {
    registry: &'a FunctionRegistry,
    filter: FunctionFilter,
    ids: Vec<FunctionId>,
}

impl<'a> FunctionListing<'a> {
    /// Ids captured when the listing was created.
    pub fn ids(&self) -> &[FunctionId] {
        &self.ids
    }

    /// Number of ids captured.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates the current records. Each call starts over.
    pub fn iter(&self) -> ListingIter<'_> {
        ListingIter {
            registry: self.registry,
            filter: &self.filter,
            ids: self.ids.iter(),
        }
    }
}

impl fmt::Debug for FunctionListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionListing")
            .field("filter", &self.filter)
            .field("ids", &self.ids)
            .finish()
    }
}

impl<'l> IntoIterator for &'l FunctionListing<'_> {
    type Item = FunctionRecord;
    type IntoIter = ListingIter<'l>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`FunctionListing`].
pub struct ListingIter<'l> {
    registry: &'l FunctionRegistry,
    filter: &'l FunctionFilter,
    ids: std::slice::Iter<'l, FunctionId>,
}

impl Iterator for ListingIter<'_> {
    type Item = FunctionRecord;

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            if let Ok(record) = self.registry.get(id.as_str()) {
                if self.filter.matches(&record) {
                    return Some(record);
                }
            }
        }
        None
    }
}
