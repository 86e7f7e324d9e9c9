//! Per-second aggregation of raw snapshots
//!
//! The [`Aggregator`] folds snapshots into a bucket of sums and counts, the
//! [`FlushClock`] decides when a bucket closes, and closed buckets become
//! [`AggregatedRecord`]s kept in a bounded [`RecordLog`].

use crate::calc::FPS_UNAVAILABLE;
use crate::models::{Metric, RawSnapshot, TRACKED_CORES};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Default bucket length
pub const DEFAULT_BUCKET_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of retained records (24 hours of one-second buckets)
pub const DEFAULT_MAX_RECORDS: usize = 86_400;

/// Running sum and sample count for one value
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Accumulator {
    sum: f64,
    count: u32,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Sums and counts for one open bucket
#[derive(Debug, Clone, Default)]
struct AggregationBucket {
    fps: Accumulator,
    temperature: Accumulator,
    memory: Accumulator,
    power: Accumulator,
    gpu: Accumulator,
    jank: u32,
    big_jank: u32,
    usages: [Accumulator; TRACKED_CORES],
    freqs: [Accumulator; TRACKED_CORES],
    ticks: u32,
}

impl AggregationBucket {
    fn add(&mut self, snapshot: &RawSnapshot) {
        // -1 marks "no FPS this tick" and must not drag the mean down
        if snapshot.fps >= 0.0 {
            self.fps.add(snapshot.fps);
        }
        self.temperature.add(snapshot.metric(Metric::Temperature));
        self.memory.add(snapshot.metric(Metric::Memory));
        self.power.add(snapshot.metric(Metric::Power));
        self.gpu.add(snapshot.metric(Metric::Gpu));

        self.jank = self.jank.saturating_add(snapshot.jank);
        self.big_jank = self.big_jank.saturating_add(snapshot.big_jank);

        for (acc, value) in self.usages.iter_mut().zip(&snapshot.usages) {
            acc.add(*value);
        }
        for (acc, value) in self.freqs.iter_mut().zip(&snapshot.freqs) {
            acc.add(*value);
        }

        self.ticks += 1;
    }

    fn to_record(&self, timestamp: DateTime<Utc>) -> AggregatedRecord {
        let mean = |acc: &Accumulator| acc.mean().unwrap_or(0.0);

        AggregatedRecord {
            timestamp,
            fps: self.fps.mean().unwrap_or(FPS_UNAVAILABLE),
            temperature: mean(&self.temperature),
            memory_percent: mean(&self.memory),
            power_mw: mean(&self.power),
            gpu_percent: mean(&self.gpu),
            jank: self.jank,
            big_jank: self.big_jank,
            cpu_usage: self.usages.map(|acc| mean(&acc)),
            cpu_freq: self.freqs.map(|acc| mean(&acc)),
            samples: self.ticks,
        }
    }
}

/// One closed bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub timestamp: DateTime<Utc>,
    /// Mean FPS over ticks that had one, -1 when none did
    pub fps: f64,
    pub temperature: f64,
    pub memory_percent: f64,
    pub power_mw: f64,
    pub gpu_percent: f64,
    pub jank: u32,
    pub big_jank: u32,
    pub cpu_usage: [f64; TRACKED_CORES],
    pub cpu_freq: [f64; TRACKED_CORES],
    /// Snapshots folded into this record
    pub samples: u32,
}

impl AggregatedRecord {
    /// Column names in persisted order
    pub fn csv_header() -> Vec<String> {
        let mut header: Vec<String> = ["Time", "FPS", "Temp", "Mem", "Power", "GPU", "Jank", "Big Jank"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        header.extend((0..TRACKED_CORES).map(|i| format!("CPU{}%", i)));
        header.extend((0..TRACKED_CORES).map(|i| format!("Core{}(MHz)", i)));
        header
    }

    /// Field values in the same order as [`csv_header`](Self::csv_header)
    pub fn to_row(&self) -> Vec<String> {
        let mut row = vec![
            self.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string(),
            format!("{:.1}", self.fps),
            format!("{:.1}", self.temperature),
            format!("{:.1}", self.memory_percent),
            format!("{:.1}", self.power_mw),
            format!("{:.1}", self.gpu_percent),
            self.jank.to_string(),
            self.big_jank.to_string(),
        ];
        row.extend(self.cpu_usage.iter().map(|v| format!("{:.1}", v)));
        row.extend(self.cpu_freq.iter().map(|v| format!("{:.0}", v)));
        row
    }
}

/// Folds snapshots into buckets
#[derive(Debug, Default)]
pub struct Aggregator {
    bucket: AggregationBucket,
    started: bool,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the first tick with real CPU data has been seen
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Number of snapshots in the open bucket
    pub fn pending(&self) -> u32 {
        self.bucket.ticks
    }

    /// Add a snapshot to the open bucket
    ///
    /// Error snapshots are ignored, as is everything before the first
    /// snapshot carrying non-zero CPU data. Returns whether it was counted.
    pub fn accumulate(&mut self, snapshot: &RawSnapshot) -> bool {
        if snapshot.is_error() {
            return false;
        }
        if !self.started {
            if !snapshot.has_cpu_data() {
                return false;
            }
            self.started = true;
        }

        self.bucket.add(snapshot);
        true
    }

    /// Close the open bucket, `None` if nothing was accumulated
    pub fn flush(&mut self, timestamp: DateTime<Utc>) -> Option<AggregatedRecord> {
        if self.bucket.ticks == 0 {
            return None;
        }

        let record = self.bucket.to_record(timestamp);
        self.bucket = AggregationBucket::default();
        Some(record)
    }

    /// Drop the open bucket and wait for CPU data again
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Drift-corrected flush schedule
///
/// The deadline advances by exactly one interval per flush. If the caller
/// falls more than two intervals behind, the schedule restarts from now
/// instead of firing a burst of catch-up flushes.
#[derive(Debug, Clone)]
pub struct FlushClock {
    interval: Duration,
    next: Instant,
}

impl FlushClock {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_deadline(&self) -> Instant {
        self.next
    }

    /// Whether a flush is due at `now`; advances the deadline when it is
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }

        if now.duration_since(self.next) > self.interval * 2 {
            self.next = now + self.interval;
        } else {
            self.next += self.interval;
        }
        true
    }
}

/// Bounded FIFO of closed records, oldest evicted first
#[derive(Debug, Clone)]
pub struct RecordLog {
    records: VecDeque<AggregatedRecord>,
    max_size: usize,
    evicted: u64,
}

impl Default for RecordLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

impl RecordLog {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            records: VecDeque::with_capacity(max_size.min(10_000)),
            max_size,
            evicted: 0,
        }
    }

    pub fn push(&mut self, record: AggregatedRecord) {
        while self.records.len() >= self.max_size {
            self.records.pop_front();
            self.evicted += 1;
        }
        self.records.push_back(record);
    }

    /// Copy of every retained record, oldest first
    pub fn records(&self) -> Vec<AggregatedRecord> {
        self.records.iter().cloned().collect()
    }

    /// The newest `limit` records, oldest first
    pub fn tail(&self, limit: usize) -> Vec<AggregatedRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn drain(&mut self) -> Vec<AggregatedRecord> {
        self.records.drain(..).collect()
    }

    /// Remove and return up to `limit` of the oldest records
    pub fn drain_batch(&mut self, limit: usize) -> Vec<AggregatedRecord> {
        let count = limit.min(self.records.len());
        self.records.drain(..count).collect()
    }

    pub fn latest(&self) -> Option<&AggregatedRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.evicted = 0;
    }

    pub fn stats(&self) -> RecordLogStats {
        RecordLogStats {
            entries: self.records.len(),
            capacity: self.max_size,
            evicted: self.evicted,
            oldest: self.records.front().map(|r| r.timestamp),
            newest: self.records.back().map(|r| r.timestamp),
        }
    }
}

/// Record log statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordLogStats {
    pub entries: usize,
    pub capacity: usize,
    /// Records dropped to stay within capacity
    pub evicted: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(value: f64, jank: u32) -> RawSnapshot {
        let mut snapshot = RawSnapshot::failed(0.0, "");
        snapshot.error = None;
        snapshot.fps = value;
        snapshot.temperature = value;
        snapshot.memory_percent = value;
        snapshot.gpu_percent = value;
        snapshot.usages = vec![value, value * 2.0];
        snapshot.freqs = vec![1000.0 + value];
        snapshot.jank = jank;
        snapshot
    }

    fn record_at(secs: i64) -> AggregatedRecord {
        let mut aggregator = Aggregator::new();
        aggregator.accumulate(&snapshot(10.0, 0));
        aggregator
            .flush(DateTime::<Utc>::from_timestamp(secs, 0).unwrap())
            .unwrap()
    }

    #[test]
    fn test_bucket_averages_and_sums() {
        let mut aggregator = Aggregator::new();
        for (value, jank) in [(10.0, 1), (20.0, 0), (30.0, 2)] {
            assert!(aggregator.accumulate(&snapshot(value, jank)));
        }

        let record = aggregator.flush(Utc::now()).unwrap();
        assert_eq!(record.fps, 20.0);
        assert_eq!(record.temperature, 20.0);
        assert_eq!(record.jank, 3);
        assert_eq!(record.cpu_usage[0], 20.0);
        assert_eq!(record.cpu_usage[1], 40.0);
        assert_eq!(record.cpu_usage[2], 0.0);
        assert_eq!(record.cpu_freq[0], 1020.0);
        assert_eq!(record.samples, 3);

        // Reset after flush
        assert_eq!(aggregator.pending(), 0);
        assert!(aggregator.flush(Utc::now()).is_none());
    }

    #[test]
    fn test_logging_waits_for_cpu_data() {
        let mut aggregator = Aggregator::new();
        let mut startup = snapshot(0.0, 0);
        startup.freqs = vec![0.0];
        startup.fps = 60.0;

        assert!(!aggregator.accumulate(&startup));
        assert!(!aggregator.is_started());
        assert!(aggregator.flush(Utc::now()).is_none());

        assert!(aggregator.accumulate(&snapshot(10.0, 0)));
        // Once started, zero-CPU ticks count too
        assert!(aggregator.accumulate(&startup));
        assert_eq!(aggregator.pending(), 2);
    }

    #[test]
    fn test_error_snapshots_are_skipped() {
        let mut aggregator = Aggregator::new();
        aggregator.accumulate(&snapshot(10.0, 0));
        assert!(!aggregator.accumulate(&RawSnapshot::failed(0.5, "boom")));
        assert_eq!(aggregator.pending(), 1);
    }

    #[test]
    fn test_unavailable_fps_excluded_from_mean() {
        let mut aggregator = Aggregator::new();
        aggregator.accumulate(&snapshot(30.0, 0));
        aggregator.accumulate(&snapshot(-1.0, 0));
        assert_eq!(aggregator.flush(Utc::now()).unwrap().fps, 30.0);

        let mut no_fps = snapshot(10.0, 0);
        no_fps.fps = -1.0;
        aggregator.accumulate(&no_fps);
        assert_eq!(aggregator.flush(Utc::now()).unwrap().fps, FPS_UNAVAILABLE);
    }

    #[test]
    fn test_csv_layout() {
        let header = AggregatedRecord::csv_header();
        assert_eq!(header.len(), 8 + 2 * TRACKED_CORES);
        assert_eq!(&header[..8], &["Time", "FPS", "Temp", "Mem", "Power", "GPU", "Jank", "Big Jank"]);
        assert_eq!(header[8], "CPU0%");
        assert_eq!(header[23], "Core7(MHz)");

        let row = record_at(0).to_row();
        assert_eq!(row.len(), header.len());
        assert_eq!(row[1], "10.0");
        assert_eq!(row[8], "10.0");
        assert_eq!(row[16], "1010");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_clock_advances_by_interval() {
        let start = Instant::now();
        let mut clock = FlushClock::new(Duration::from_secs(1), start);

        assert!(!clock.poll(start + Duration::from_millis(999)));
        assert!(clock.poll(start + Duration::from_millis(1100)));
        // No drift accumulates: next target is 2s, not 2.1s
        assert_eq!(clock.next_deadline(), start + Duration::from_secs(2));
        assert!(clock.poll(start + Duration::from_millis(2000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_clock_resyncs_after_large_drift() {
        let start = Instant::now();
        let mut clock = FlushClock::new(Duration::from_secs(1), start);

        let late = start + Duration::from_millis(3500);
        assert!(clock.poll(late));
        assert_eq!(clock.next_deadline(), late + Duration::from_secs(1));
        assert!(!clock.poll(late + Duration::from_millis(500)));
    }

    #[test]
    fn test_record_log_capacity_limit() {
        let mut log = RecordLog::new(5);
        for i in 0..10 {
            log.push(record_at(i));
        }

        assert_eq!(log.len(), 5);
        let stats = log.stats();
        assert_eq!(stats.evicted, 5);
        assert_eq!(stats.oldest.unwrap().timestamp(), 5);
        assert_eq!(stats.newest.unwrap().timestamp(), 9);

        let tail = log.tail(2);
        assert_eq!(tail[0].timestamp.timestamp(), 8);
        assert_eq!(log.latest().unwrap().timestamp.timestamp(), 9);
    }

    #[test]
    fn test_record_log_drain_batch() {
        let mut log = RecordLog::new(100);
        for i in 0..10 {
            log.push(record_at(i));
        }

        let batch = log.drain_batch(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].timestamp.timestamp(), 0);
        assert_eq!(log.len(), 7);
        assert_eq!(log.records().len(), 7);

        assert_eq!(log.drain().len(), 7);
        assert!(log.is_empty());
    }
}
