//! Fixed-capacity history of every displayed series

use crate::models::{RawSnapshot, SeriesKey};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Default points kept per series
pub const DEFAULT_HISTORY_CAPACITY: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Seconds since monitoring started
    pub elapsed_secs: f64,
    pub value: f64,
}

/// Ring buffer of points ordered by elapsed time
#[derive(Debug, Clone)]
pub struct HistorySeries {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl HistorySeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest when full
    ///
    /// An elapsed time earlier than the newest point is clamped to it so the
    /// series never goes backwards.
    pub fn push(&mut self, elapsed_secs: f64, value: f64) {
        let elapsed_secs = match self.points.back() {
            Some(last) if elapsed_secs < last.elapsed_secs => last.elapsed_secs,
            _ => elapsed_secs,
        };

        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(HistoryPoint {
            elapsed_secs,
            value,
        });
    }

    /// Copy of the whole series, oldest first
    pub fn points(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<HistoryPoint> {
        self.points.back().copied()
    }

    /// Points no older than `span_secs` before the newest one
    pub fn window(&self, span_secs: f64) -> Vec<HistoryPoint> {
        let newest = match self.points.back() {
            Some(point) => point.elapsed_secs,
            None => return Vec::new(),
        };
        let start = newest - span_secs;

        self.points
            .iter()
            .skip_while(|p| p.elapsed_secs < start)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// One series per scalar metric and per tracked core
#[derive(Debug, Clone)]
pub struct HistoryStore {
    series: HashMap<SeriesKey, HistorySeries>,
    capacity: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        let series = SeriesKey::all()
            .into_iter()
            .map(|key| (key, HistorySeries::new(capacity)))
            .collect();

        Self {
            series,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append every series from one snapshot
    ///
    /// Cores the snapshot does not report are recorded as 0.
    pub fn record(&mut self, snapshot: &RawSnapshot) {
        let elapsed = snapshot.elapsed_secs;

        for (key, series) in self.series.iter_mut() {
            let value = match key {
                SeriesKey::Scalar(metric) => snapshot.metric(*metric),
                SeriesKey::CoreUsage(core) => snapshot.usages.get(*core).copied().unwrap_or(0.0),
                SeriesKey::CoreFreq(core) => snapshot.freqs.get(*core).copied().unwrap_or(0.0),
            };
            series.push(elapsed, value);
        }
    }

    /// Copy of one series, empty for an unknown key
    pub fn series(&self, key: SeriesKey) -> Vec<HistoryPoint> {
        self.series
            .get(&key)
            .map(HistorySeries::points)
            .unwrap_or_default()
    }

    pub fn latest(&self, key: SeriesKey) -> Option<HistoryPoint> {
        self.series.get(&key).and_then(HistorySeries::latest)
    }

    pub fn window(&self, key: SeriesKey, span_secs: f64) -> Vec<HistoryPoint> {
        self.series
            .get(&key)
            .map(|series| series.window(span_secs))
            .unwrap_or_default()
    }

    /// Points held by the fullest series
    pub fn len(&self) -> usize {
        self.series.values().map(HistorySeries::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.series.values_mut().for_each(HistorySeries::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metric, TRACKED_CORES};

    #[test]
    fn test_series_capacity_and_eviction() {
        let mut series = HistorySeries::new(3);
        for i in 0..4 {
            series.push(i as f64, i as f64 * 10.0);
        }

        let points = series.points();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].elapsed_secs, 1.0);
        assert_eq!(series.latest().unwrap().value, 30.0);
        assert!(points.windows(2).all(|w| w[0].elapsed_secs <= w[1].elapsed_secs));
    }

    #[test]
    fn test_out_of_order_elapsed_is_clamped() {
        let mut series = HistorySeries::new(10);
        series.push(5.0, 1.0);
        series.push(4.0, 2.0);
        series.push(6.0, 3.0);

        let elapsed: Vec<f64> = series.points().iter().map(|p| p.elapsed_secs).collect();
        assert_eq!(elapsed, vec![5.0, 5.0, 6.0]);
    }

    #[test]
    fn test_window() {
        let mut series = HistorySeries::new(100);
        for i in 0..20 {
            series.push(i as f64 * 0.5, i as f64);
        }

        let window = series.window(2.0);
        assert_eq!(window.first().unwrap().elapsed_secs, 7.5);
        assert_eq!(window.last().unwrap().elapsed_secs, 9.5);
        assert_eq!(window.len(), 5);
        assert!(HistorySeries::new(4).window(10.0).is_empty());
    }

    #[test]
    fn test_store_records_every_series() {
        let mut store = HistoryStore::new(4);
        let mut snapshot = RawSnapshot::failed(1.5, "");
        snapshot.error = None;
        snapshot.fps = 58.0;
        snapshot.usages = vec![10.0, 20.0];
        snapshot.freqs = vec![1800.0];

        store.record(&snapshot);

        assert_eq!(store.latest(SeriesKey::Scalar(Metric::Fps)).unwrap().value, 58.0);
        assert_eq!(store.latest(SeriesKey::CoreUsage(1)).unwrap().value, 20.0);
        assert_eq!(store.latest(SeriesKey::CoreFreq(0)).unwrap().value, 1800.0);
        // Missing cores read as zero
        assert_eq!(
            store.latest(SeriesKey::CoreUsage(TRACKED_CORES - 1)).unwrap().value,
            0.0
        );
        assert_eq!(store.series(SeriesKey::CoreFreq(3)).len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_never_exceeds_capacity() {
        let mut store = HistoryStore::new(5);
        let mut snapshot = RawSnapshot::failed(0.0, "");
        for i in 0..6 {
            snapshot.elapsed_secs = i as f64;
            snapshot.temperature = i as f64;
            store.record(&snapshot);
        }

        let temps = store.series(SeriesKey::Scalar(Metric::Temperature));
        assert_eq!(temps.len(), 5);
        assert_eq!(temps[0].value, 1.0);

        store.clear();
        assert!(store.is_empty());
    }
}
