//! Observability infrastructure for the sampling engine
//!
//! Provides:
//! - Prometheus self-metrics (tick latency, fetch errors, dropped snapshots, flushed records)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for tick latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    tick_latency_seconds: Histogram,
    ticks: IntCounter,
    tick_errors: IntCounter,
    fetch_errors: IntCounterVec,
    dropped_snapshots: IntCounter,
    records_flushed: IntCounter,
    record_log_items: IntGauge,
    jank: IntCounter,
    big_jank: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "perf_monitor_tick_latency_seconds",
                "Time spent assembling one raw snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            ticks: register_int_counter!(
                "perf_monitor_ticks_total",
                "Total number of sampler ticks that emitted a snapshot"
            )
            .expect("Failed to register ticks"),

            tick_errors: register_int_counter!(
                "perf_monitor_tick_errors_total",
                "Total number of ticks that produced an error snapshot"
            )
            .expect("Failed to register tick_errors"),

            fetch_errors: register_int_counter_vec!(
                "perf_monitor_fetch_errors_total",
                "Total number of failed metric reads, by metric",
                &["metric"]
            )
            .expect("Failed to register fetch_errors"),

            dropped_snapshots: register_int_counter!(
                "perf_monitor_dropped_snapshots_total",
                "Snapshots discarded because the consumer fell behind"
            )
            .expect("Failed to register dropped_snapshots"),

            records_flushed: register_int_counter!(
                "perf_monitor_records_flushed_total",
                "Total number of aggregated records produced"
            )
            .expect("Failed to register records_flushed"),

            record_log_items: register_int_gauge!(
                "perf_monitor_record_log_items",
                "Number of aggregated records currently retained"
            )
            .expect("Failed to register record_log_items"),

            jank: register_int_counter!(
                "perf_monitor_jank_total",
                "Total number of jank frames detected"
            )
            .expect("Failed to register jank"),

            big_jank: register_int_counter!(
                "perf_monitor_big_jank_total",
                "Total number of big jank frames detected"
            )
            .expect("Failed to register big_jank"),
        }
    }
}

/// Sampling engine metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MonitorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MonitorMetrics")
    }
}

impl MonitorMetrics {
    /// Create a metrics handle, registering the global metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, elapsed: Duration) {
        self.inner().tick_latency_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn inc_ticks(&self) {
        self.inner().ticks.inc();
    }

    pub fn inc_tick_errors(&self) {
        self.inner().tick_errors.inc();
    }

    /// Count a failed read of `metric`
    pub fn inc_fetch_errors(&self, metric: &str) {
        self.inner().fetch_errors.with_label_values(&[metric]).inc();
    }

    pub fn inc_dropped_snapshots(&self) {
        self.inner().dropped_snapshots.inc();
    }

    /// Record a flushed aggregate and the resulting log size
    pub fn record_flushed(&self, retained: usize) {
        self.inner().records_flushed.inc();
        self.inner().record_log_items.set(retained as i64);
    }

    pub fn add_jank(&self, jank: u32, big_jank: u32) {
        self.inner().jank.inc_by(u64::from(jank));
        self.inner().big_jank.inc_by(u64::from(big_jank));
    }
}

/// Structured logger for session events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    device: String,
}

impl StructuredLogger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    /// Log session startup
    pub fn log_session_started(&self, package: Option<&str>, interval: Duration) {
        info!(
            event = "session_started",
            device = %self.device,
            package = package.unwrap_or("<foreground>"),
            interval_ms = interval.as_millis() as u64,
            "Monitoring session started"
        );
    }

    /// Log one aggregated record
    pub fn log_record_flushed(&self, fps: f64, jank: u32, big_jank: u32, retained: usize) {
        info!(
            event = "record_flushed",
            device = %self.device,
            fps = fps,
            jank = jank,
            big_jank = big_jank,
            retained = retained,
            "Aggregated record flushed"
        );
    }

    /// Log an error snapshot; warns once the error streak reaches `threshold`
    pub fn log_tick_error(&self, error: &str, consecutive: u32, threshold: u32) {
        if consecutive >= threshold {
            warn!(
                event = "tick_error",
                device = %self.device,
                error = %error,
                consecutive = consecutive,
                "Sampler keeps failing, session degraded"
            );
        } else {
            info!(
                event = "tick_error",
                device = %self.device,
                error = %error,
                consecutive = consecutive,
                "Sampler tick failed"
            );
        }
    }

    /// Log session shutdown
    pub fn log_session_stopped(&self, snapshots: u64, records: usize) {
        info!(
            event = "session_stopped",
            device = %self.device,
            snapshots = snapshots,
            records = records,
            "Monitoring session stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_observe() {
        let metrics = MonitorMetrics::new();
        let before = metrics.inner().jank.get();

        metrics.observe_tick_latency(Duration::from_millis(3));
        metrics.inc_ticks();
        metrics.inc_tick_errors();
        metrics.inc_fetch_errors("temperature");
        metrics.inc_dropped_snapshots();
        metrics.record_flushed(12);
        metrics.add_jank(2, 1);

        assert!(metrics.inner().jank.get() >= before + 2);
        assert!(metrics
            .inner()
            .fetch_errors
            .with_label_values(&["temperature"])
            .get() >= 1);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("pixel-7");
        assert_eq!(logger.device, "pixel-7");
    }
}
