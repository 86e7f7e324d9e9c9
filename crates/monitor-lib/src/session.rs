//! A monitoring session: sampler, consumer and the shared stores they feed
//!
//! The consumer task receives every snapshot, keeps the history window and
//! jank totals current, closes aggregation buckets on the flush clock and
//! fans snapshots out to subscribers. Readers go through [`SessionView`].

use crate::aggregate::{
    AggregatedRecord, Aggregator, FlushClock, RecordLog, RecordLogStats, DEFAULT_BUCKET_INTERVAL,
    DEFAULT_MAX_RECORDS,
};
use crate::health::{components, HealthRegistry, DEGRADED_AFTER_ERRORS};
use crate::history::{HistoryPoint, HistoryStore, DEFAULT_HISTORY_CAPACITY};
use crate::models::{RawSnapshot, SeriesKey};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sampler::{SamplerBuilder, SamplerConfig, SamplerHandle};
use crate::source::DeviceSource;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for a monitoring session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sampler: SamplerConfig,
    /// Length of one aggregation bucket (default: 1 second)
    pub bucket_interval: Duration,
    /// Aggregated records retained for the pull interface
    pub max_records: usize,
    /// Points kept per history series
    pub history_capacity: usize,
    /// Snapshots a slow subscriber may lag behind before missing some
    pub subscriber_capacity: usize,
    /// Device label used in structured log events
    pub label: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            bucket_interval: DEFAULT_BUCKET_INTERVAL,
            max_records: DEFAULT_MAX_RECORDS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            subscriber_capacity: 64,
            label: "device".to_string(),
        }
    }
}

/// Jank counted since the session started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JankTotals {
    pub jank: u64,
    pub big_jank: u64,
}

/// Read access to the stores a session fills
///
/// Cheap to clone; every clone sees the same data. A view can outlive its
/// session and be handed to the next one, which clears it on start.
#[derive(Debug, Clone)]
pub struct SessionView {
    history: Arc<RwLock<HistoryStore>>,
    records: Arc<RwLock<RecordLog>>,
    latest: Arc<RwLock<Option<RawSnapshot>>>,
    jank: Arc<RwLock<JankTotals>>,
    health: HealthRegistry,
}

impl Default for SessionView {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_RECORDS)
    }
}

impl SessionView {
    pub fn new(history_capacity: usize, max_records: usize) -> Self {
        Self {
            history: Arc::new(RwLock::new(HistoryStore::new(history_capacity))),
            records: Arc::new(RwLock::new(RecordLog::new(max_records))),
            latest: Arc::new(RwLock::new(None)),
            jank: Arc::new(RwLock::new(JankTotals::default())),
            health: HealthRegistry::new(),
        }
    }

    async fn reset(&self, history_capacity: usize, max_records: usize) {
        *self.history.write().await = HistoryStore::new(history_capacity);
        *self.records.write().await = RecordLog::new(max_records);
        *self.latest.write().await = None;
        *self.jank.write().await = JankTotals::default();
    }

    /// Copy of one history series
    pub async fn history(&self, key: SeriesKey) -> Vec<HistoryPoint> {
        self.history.read().await.series(key)
    }

    /// Points of one series within `span_secs` of its newest point
    pub async fn history_window(&self, key: SeriesKey, span_secs: f64) -> Vec<HistoryPoint> {
        self.history.read().await.window(key, span_secs)
    }

    /// Every retained aggregated record, oldest first
    pub async fn records(&self) -> Vec<AggregatedRecord> {
        self.records.read().await.records()
    }

    /// The newest `limit` aggregated records, oldest first
    pub async fn recent_records(&self, limit: usize) -> Vec<AggregatedRecord> {
        self.records.read().await.tail(limit)
    }

    pub async fn record_stats(&self) -> RecordLogStats {
        self.records.read().await.stats()
    }

    /// Most recent snapshot, error snapshots included
    pub async fn latest(&self) -> Option<RawSnapshot> {
        self.latest.read().await.clone()
    }

    pub async fn jank_totals(&self) -> JankTotals {
        *self.jank.read().await
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }
}

/// A running monitoring session
pub struct MonitorSession {
    sampler: SamplerHandle,
    consumer: JoinHandle<u64>,
    events: broadcast::Sender<RawSnapshot>,
    view: SessionView,
    logger: StructuredLogger,
}

impl MonitorSession {
    /// Start sampling `source` into a fresh view
    pub async fn start(source: Arc<dyn DeviceSource>, config: SessionConfig) -> Result<Self> {
        let view = SessionView::new(config.history_capacity, config.max_records);
        Self::start_with_view(source, config, view).await
    }

    /// Start sampling `source` into an existing view, clearing it first
    pub async fn start_with_view(
        source: Arc<dyn DeviceSource>,
        config: SessionConfig,
        view: SessionView,
    ) -> Result<Self> {
        if config.bucket_interval.is_zero() {
            anyhow::bail!("Bucket interval must be greater than zero");
        }

        let (sampler, snapshot_rx) = SamplerBuilder::new()
            .source(source)
            .config(config.sampler.clone())
            .build()
            .context("Failed to build sampler")?;

        view.reset(config.history_capacity, config.max_records).await;
        view.health.register(components::SAMPLER).await;

        let (events, _) = broadcast::channel(config.subscriber_capacity.max(1));
        let logger = StructuredLogger::new(config.label.clone());

        let consumer = Consumer {
            snapshot_rx,
            view: view.clone(),
            events: events.clone(),
            aggregator: Aggregator::new(),
            clock: FlushClock::new(config.bucket_interval, Instant::now()),
            logger: logger.clone(),
            metrics: MonitorMetrics::new(),
            received: 0,
        };
        let consumer = tokio::spawn(consumer.run());
        let sampler = sampler.spawn();

        view.health.set_ready(true).await;
        logger.log_session_started(config.sampler.package.as_deref(), config.sampler.interval);

        Ok(Self {
            sampler,
            consumer,
            events,
            view,
            logger,
        })
    }

    /// Receive every snapshot from now on, error snapshots included
    pub fn subscribe(&self) -> broadcast::Receiver<RawSnapshot> {
        self.events.subscribe()
    }

    pub fn view(&self) -> SessionView {
        self.view.clone()
    }

    /// Stop sampling, let the consumer drain and close the last bucket
    ///
    /// Returns once both tasks have ended.
    pub async fn stop(self) -> Result<()> {
        let sampler_result = self.sampler.stop().await;
        let received = self.consumer.await.context("Consumer task failed")?;

        self.view.health.set_ready(false).await;
        self.view
            .health
            .set_unhealthy(components::SAMPLER, "session stopped")
            .await;

        let records = self.view.records.read().await.len();
        self.logger.log_session_stopped(received, records);

        sampler_result
    }
}

/// Consumer side of the snapshot channel
struct Consumer {
    snapshot_rx: mpsc::Receiver<RawSnapshot>,
    view: SessionView,
    events: broadcast::Sender<RawSnapshot>,
    aggregator: Aggregator,
    clock: FlushClock,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
    received: u64,
}

impl Consumer {
    async fn run(mut self) -> u64 {
        loop {
            tokio::select! {
                snapshot = self.snapshot_rx.recv() => match snapshot {
                    Some(snapshot) => self.handle(snapshot).await,
                    None => break,
                },
                _ = tokio::time::sleep_until(self.clock.next_deadline()) => {}
            }

            if self.clock.poll(Instant::now()) {
                self.flush().await;
            }
        }

        // Partial last bucket
        self.flush().await;
        debug!(received = self.received, "Snapshot consumer finished");
        self.received
    }

    async fn handle(&mut self, snapshot: RawSnapshot) {
        self.received += 1;

        let streak = self
            .view
            .health
            .record_outcome(components::SAMPLER, snapshot.error.as_deref())
            .await;

        match &snapshot.error {
            Some(error) => self.logger.log_tick_error(error, streak, DEGRADED_AFTER_ERRORS),
            None => {
                {
                    let mut totals = self.view.jank.write().await;
                    totals.jank += u64::from(snapshot.jank);
                    totals.big_jank += u64::from(snapshot.big_jank);
                }
                self.view.history.write().await.record(&snapshot);
                self.aggregator.accumulate(&snapshot);
            }
        }

        *self.view.latest.write().await = Some(snapshot.clone());

        // No subscribers is fine
        let _ = self.events.send(snapshot);
    }

    async fn flush(&mut self) {
        let record = match self.aggregator.flush(Utc::now()) {
            Some(record) => record,
            None => return,
        };

        let retained = {
            let mut log = self.view.records.write().await;
            log.push(record.clone());
            log.len()
        };

        self.metrics.record_flushed(retained);
        self.logger
            .log_record_flushed(record.fps, record.jank, record.big_jank, retained);
    }
}
