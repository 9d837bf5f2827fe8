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

//! Rolling sample windows for durations, loads and failure ratios.

use hestia_core::FunctionId;
use std::collections::{HashMap, VecDeque};

/// Number of samples kept per series in a [`SeriesStore`].
pub const WINDOW_SIZE: usize = 64;

/// The series the monitoring path keeps windows for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Series {
    /// Share of failed executions per bridge tick.
    FailureRatio,
    /// Requests rejected per bridge tick.
    Rejections,
    CpuLoad,
    MemoryLoad,
    /// Execution durations of one function, in milliseconds.
    Duration(FunctionId),
}

/// The newest `capacity` samples of one series.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest once full.
    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    /// Mean of the newest half minus mean of the oldest half. Positive when
    /// values are rising; 0.0 with fewer than two samples.
    pub fn trend(&self) -> f32 {
        let half = self.samples.len() / 2;
        if half == 0 {
            return 0.0;
        }
        let older: f32 = self.samples.iter().take(half).sum();
        let newer: f32 = self.samples.iter().rev().take(half).sum();
        (newer - older) / half as f32
    }

    pub fn max(&self) -> Option<f32> {
        self.samples.iter().copied().reduce(f32::max)
    }
}

/// Windows keyed by [`Series`]. Unknown series read as empty.
#[derive(Debug, Default)]
pub struct SeriesStore {
    windows: HashMap<Series, SampleWindow>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, series: Series, value: f32) {
        self.windows
            .entry(series)
            .or_insert_with(|| SampleWindow::new(WINDOW_SIZE))
            .push(value);
    }

    pub fn window(&self, series: &Series) -> Option<&SampleWindow> {
        self.windows.get(series)
    }

    /// Mean of the window, or 0.0 when no sample was recorded.
    pub fn mean(&self, series: &Series) -> f32 {
        self.window(series).map_or(0.0, SampleWindow::mean)
    }

    pub fn trend(&self, series: &Series) -> f32 {
        self.window(series).map_or(0.0, SampleWindow::trend)
    }

    pub fn latest(&self, series: &Series) -> Option<f32> {
        self.window(series).and_then(SampleWindow::latest)
    }

    pub fn samples(&self, series: &Series) -> usize {
        self.window(series).map_or(0, SampleWindow::len)
    }

    /// Drops the windows of an unregistered function.
    pub fn forget_function(&mut self, id: &FunctionId) -> bool {
        self.windows.remove(&Series::Duration(id.clone())).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = SampleWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.mean(), 3.0);
        assert_eq!(window.latest(), Some(4.0));
        assert_eq!(window.max(), Some(4.0));
    }

    #[test]
    fn test_trend_compares_halves() {
        let mut window = SampleWindow::new(8);
        for v in [10.0, 10.0, 20.0, 20.0] {
            window.push(v);
        }
        assert!((window.trend() - 10.0).abs() < 0.001);

        // The middle sample of an odd count belongs to neither half.
        window.push(20.0);
        assert!((window.trend() - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_empty_window() {
        let window = SampleWindow::new(4);
        assert!(window.is_empty());
        assert_eq!(window.mean(), 0.0);
        assert_eq!(window.trend(), 0.0);
        assert_eq!(window.max(), None);
    }

    #[test]
    fn test_forget_function() {
        let mut store = SeriesStore::new();
        let a = FunctionId::new("a");
        store.push(Series::Duration(a.clone()), 1.0);
        store.push(Series::Duration(FunctionId::new("b")), 2.0);
        store.push(Series::CpuLoad, 0.5);

        assert!(store.forget_function(&a));
        assert!(!store.forget_function(&a));
        assert_eq!(store.samples(&Series::Duration(a)), 0);
        assert_eq!(store.latest(&Series::Duration(FunctionId::new("b"))), Some(2.0));
        assert_eq!(store.mean(&Series::CpuLoad), 0.5);
    }
}
