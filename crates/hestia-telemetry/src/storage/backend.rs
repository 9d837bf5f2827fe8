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

//! The storage seam behind [`MetricsRegistry`](crate::MetricsRegistry).

use crate::metrics::{ExportError, Metric, MetricId, MetricValue};
use std::fmt::Debug;

/// Storage for exported series. Implementations are shared between the
/// bridge thread publishing samples and whoever scrapes them.
pub trait MetricsBackend: Send + Sync + Debug {
    /// Stores `value` under `id`, creating the series on first use.
    ///
    /// Fails if the series exists with a different kind. Help text and unit
    /// are only taken when the series is created.
    fn upsert(
        &self,
        id: &MetricId,
        help: &str,
        unit: &str,
        value: MetricValue,
    ) -> Result<(), ExportError>;

    fn get(&self, id: &MetricId) -> Option<Metric>;

    /// Every series, ordered by id.
    fn all(&self) -> Vec<Metric>;

    /// Keeps the series for which `keep` returns `true`. Returns how many
    /// were removed.
    fn retain(&self, keep: &dyn Fn(&Metric) -> bool) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The series matching `filter`, ordered by id.
    fn matching(&self, filter: &dyn Fn(&Metric) -> bool) -> Vec<Metric> {
        self.all().into_iter().filter(|m| filter(m)).collect()
    }
}
