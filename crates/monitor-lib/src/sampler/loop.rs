//! Sampler task
//!
//! Runs the fast/slow/jank cadences on one task and emits one raw snapshot
//! per tick without ever blocking on the consumer.

use super::cache::{SlowFetch, SlowMetricCache};
use super::task::{guarded, isolated, stop_requested};
use crate::calc::{CpuBaseline, CpuObservation, JankCount, JankRule, JankTracker};
use crate::error::{SamplerError, SourceResult};
use crate::models::{CoreCounters, RawSnapshot};
use crate::observability::MonitorMetrics;
use crate::source::DeviceSource;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the sampler
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Tick interval for CPU counters and frequencies (default: 500 ms)
    pub interval: Duration,
    /// Refresh interval for slow metrics (default: 2 seconds)
    pub slow_interval: Duration,
    /// Jank detection interval (default: 1 second)
    pub jank_interval: Duration,
    /// Snapshot channel capacity
    pub buffer_size: usize,
    /// Package to monitor; the foreground package when unset
    pub package: Option<String>,
    pub jank_rule: JankRule,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            slow_interval: Duration::from_secs(2),
            jank_interval: Duration::from_secs(1),
            buffer_size: 16,
            package: None,
            jank_rule: JankRule::default(),
        }
    }
}

/// State carried from one tick to the next, owned by the sampler task
#[derive(Debug)]
struct SamplerState {
    cpu: CpuBaseline,
    slow: SlowMetricCache,
    jank: JankTracker,
    last_jank_check: Option<Instant>,
}

struct FastFetch {
    counters: SourceResult<Vec<CoreCounters>>,
    freqs: SourceResult<Vec<f64>>,
}

/// Periodic sampler producing [`RawSnapshot`]s
pub struct Sampler {
    source: Arc<dyn DeviceSource>,
    config: SamplerConfig,
    snapshot_tx: mpsc::Sender<RawSnapshot>,
    state: SamplerState,
    metrics: MonitorMetrics,
}

impl Sampler {
    /// Create a sampler and the receiving end of its snapshot channel
    pub fn new(
        source: Arc<dyn DeviceSource>,
        config: SamplerConfig,
    ) -> (Self, mpsc::Receiver<RawSnapshot>) {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(config.buffer_size.max(1));

        let sampler = Self {
            source,
            state: SamplerState {
                cpu: CpuBaseline::new(),
                slow: SlowMetricCache::new(),
                jank: JankTracker::new(config.jank_rule),
                last_jank_check: None,
            },
            config,
            snapshot_tx,
            metrics: MonitorMetrics::new(),
        };

        (sampler, snapshot_rx)
    }

    /// Run the sampler on its own task
    ///
    /// Dropping the returned handle without calling [`SamplerHandle::stop`]
    /// also stops the sampler after the current tick.
    pub fn spawn(self) -> SamplerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        SamplerHandle { stop_tx, task }
    }

    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            slow_interval_ms = self.config.slow_interval.as_millis() as u64,
            jank_interval_ms = self.config.jank_interval.as_millis() as u64,
            package = self.config.package.as_deref().unwrap_or("<foreground>"),
            "Starting sampler"
        );

        let started = Instant::now();
        let mut tick_count = 0u64;

        loop {
            let tick_start = Instant::now();
            let elapsed_secs = tick_start.duration_since(started).as_secs_f64();

            let snapshot = match self.tick(tick_start, elapsed_secs, &mut stop).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => break,
                Err(e) => {
                    self.metrics.inc_tick_errors();
                    debug!(error = %e, "Tick failed, emitting error snapshot");
                    RawSnapshot::failed(elapsed_secs, e.to_string())
                }
            };

            if !self.emit(snapshot) {
                info!("Snapshot receiver dropped, stopping sampler");
                break;
            }
            tick_count += 1;

            let spent = tick_start.elapsed();
            self.metrics.inc_ticks();
            self.metrics.observe_tick_latency(spent);
            if spent > self.config.interval {
                warn!(
                    elapsed_ms = spent.as_millis() as u64,
                    interval_ms = self.config.interval.as_millis() as u64,
                    "Tick overran its interval"
                );
            }

            tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => break,
                _ = tokio::time::sleep(self.config.interval.saturating_sub(spent)) => {}
            }
        }

        info!(ticks = tick_count, "Sampler stopped");
    }

    /// Assemble one snapshot
    ///
    /// Returns `Ok(None)` when a stop was requested mid-tick; the partial
    /// tick is abandoned and nothing is emitted for it.
    async fn tick(
        &mut self,
        now: Instant,
        elapsed_secs: f64,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<RawSnapshot>, SamplerError> {
        // A panic while reading counters leaves nothing to report for this
        // tick; frequencies fall back to empty on their own
        let source = Arc::clone(&self.source);
        let fast = match isolated("cpu", stop, async move {
            let freq_source = Arc::clone(&source);
            FastFetch {
                counters: source.cpu_counters().await,
                freqs: guarded("cpu_freq", async move { freq_source.cpu_frequencies().await })
                    .await,
            }
        })
        .await?
        {
            Some(fast) => fast,
            None => return Ok(None),
        };

        if self.state.slow.is_due(now, self.config.slow_interval) {
            let fetch = SlowFetch::fetch(
                Arc::clone(&self.source),
                self.config.package.clone(),
                self.state.slow.values().layer.clone(),
            );
            let fetch = match isolated("slow metrics", stop, fetch).await? {
                Some(fetch) => fetch,
                None => return Ok(None),
            };

            for (metric, e) in self.state.slow.apply(fetch, now) {
                debug!(metric, error = %e, "Slow metric fetch failed, keeping cached value");
                self.metrics.inc_fetch_errors(metric);
            }
        }

        let jank = match self.check_jank(now, stop).await? {
            Some(jank) => jank,
            None => return Ok(None),
        };

        let (usages, freqs) = self.cpu_values(fast);

        if *stop.borrow() {
            return Ok(None);
        }

        let slow = self.state.slow.values();
        Ok(Some(RawSnapshot {
            timestamp: Utc::now(),
            elapsed_secs,
            usages,
            freqs,
            fps: slow.fps,
            temperature: slow.temperature,
            memory_percent: slow.memory_percent,
            gpu_percent: slow.gpu_percent,
            power: slow.power,
            refresh_rate_hz: slow.refresh_rate_hz,
            jank: jank.jank,
            big_jank: jank.big_jank,
            device_name: slow.device_name.clone(),
            device_ip: slow.device_ip.clone(),
            error: None,
        }))
    }

    /// Run jank detection when its interval has elapsed
    async fn check_jank(
        &mut self,
        now: Instant,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<JankCount>, SamplerError> {
        let due = self.state.last_jank_check.map_or(true, |last| {
            now.saturating_duration_since(last) >= self.config.jank_interval
        });
        if !due {
            return Ok(Some(JankCount::default()));
        }
        self.state.last_jank_check = Some(now);

        let layer = match self.state.slow.values().layer.clone() {
            Some(layer) => layer,
            None => return Ok(Some(JankCount::default())),
        };

        let source = Arc::clone(&self.source);
        let fetch = guarded("vsync", async move { source.vsync_triplets(&layer).await });
        let triplets = match isolated("vsync", stop, fetch).await?
        {
            Some(triplets) => triplets,
            None => return Ok(None),
        };

        let count = match triplets {
            Ok(triplets) => self
                .state
                .jank
                .update(&triplets, self.state.slow.values().refresh_rate_hz),
            Err(e) => {
                debug!(error = %e, "Vsync fetch failed, reporting no jank");
                self.metrics.inc_fetch_errors("vsync");
                JankCount::default()
            }
        };

        self.metrics.add_jank(count.jank, count.big_jank);
        Ok(Some(count))
    }

    /// Per-core usages and frequencies for this tick
    fn cpu_values(&mut self, fast: FastFetch) -> (Vec<f64>, Vec<f64>) {
        let counters = match fast.counters {
            Ok(counters) => counters,
            Err(e) => {
                debug!(error = %e, "CPU counter fetch failed");
                self.metrics.inc_fetch_errors("cpu_counters");
                return (Vec::new(), Vec::new());
            }
        };

        match self.state.cpu.observe(counters) {
            CpuObservation::Baseline { cores } => (vec![0.0; cores], vec![0.0; cores]),
            CpuObservation::Usage(usages) => {
                let freqs = fast.freqs.unwrap_or_else(|e| {
                    debug!(error = %e, "CPU frequency fetch failed");
                    self.metrics.inc_fetch_errors("cpu_freq");
                    Vec::new()
                });
                (usages, freqs)
            }
        }
    }

    /// Hand a snapshot to the consumer without waiting
    ///
    /// Returns false once the receiver is gone.
    fn emit(&self, snapshot: RawSnapshot) -> bool {
        match self.snapshot_tx.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.metrics.inc_dropped_snapshots();
                debug!("Snapshot channel full, dropping snapshot");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Handle to a running sampler
#[derive(Debug)]
pub struct SamplerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Stop the sampler and wait for its task to finish
    ///
    /// Once this returns no further snapshot will be sent.
    pub async fn stop(self) -> Result<()> {
        // Err only means the task already exited
        let _ = self.stop_tx.send(true);
        self.task.await.context("Sampler task failed")
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Builder for creating a sampler
pub struct SamplerBuilder {
    source: Option<Arc<dyn DeviceSource>>,
    config: SamplerConfig,
}

impl SamplerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            config: SamplerConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn DeviceSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(mut self, config: SamplerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn slow_interval(mut self, interval: Duration) -> Self {
        self.config.slow_interval = interval;
        self
    }

    pub fn jank_interval(mut self, interval: Duration) -> Self {
        self.config.jank_interval = interval;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.config.package = Some(package.into());
        self
    }

    pub fn jank_rule(mut self, rule: JankRule) -> Self {
        self.config.jank_rule = rule;
        self
    }

    /// Build the sampler
    pub fn build(self) -> Result<(Sampler, mpsc::Receiver<RawSnapshot>)> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Device source is required"))?;

        if self.config.interval.is_zero() {
            anyhow::bail!("Sampling interval must be greater than zero");
        }

        Ok(Sampler::new(source, self.config))
    }
}

impl Default for SamplerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
