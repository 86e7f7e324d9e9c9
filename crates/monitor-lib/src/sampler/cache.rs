//! Cache for slow-changing metrics between slow polls

use super::task::guarded;
use crate::calc::{fps_from_timestamps, FPS_UNAVAILABLE};
use crate::error::{SourceError, SourceResult};
use crate::models::PowerReading;
use crate::source::DeviceSource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Last known value of every slow metric
#[derive(Debug, Clone, PartialEq)]
pub struct SlowMetrics {
    pub package: Option<String>,
    pub layer: Option<String>,
    pub fps: f64,
    pub gpu_percent: f64,
    pub temperature: f64,
    pub memory_percent: f64,
    pub power: PowerReading,
    pub refresh_rate_hz: f64,
    pub device_name: String,
    pub device_ip: String,
}

impl Default for SlowMetrics {
    fn default() -> Self {
        Self {
            package: None,
            layer: None,
            fps: FPS_UNAVAILABLE,
            gpu_percent: 0.0,
            temperature: 0.0,
            memory_percent: 0.0,
            power: PowerReading::default(),
            refresh_rate_hz: 0.0,
            device_name: String::new(),
            device_ip: String::new(),
        }
    }
}

/// Outcome of one slow poll, each metric succeeding or failing on its own
#[derive(Debug)]
pub(crate) struct SlowFetch {
    package: SourceResult<Option<String>>,
    layer: SourceResult<Option<String>>,
    fps: SourceResult<f64>,
    gpu_percent: SourceResult<f64>,
    temperature: SourceResult<f64>,
    memory_percent: SourceResult<f64>,
    power: SourceResult<Option<PowerReading>>,
    refresh_rate_hz: SourceResult<f64>,
    device_name: SourceResult<String>,
    device_ip: SourceResult<String>,
}

impl SlowFetch {
    /// Poll every slow metric once
    ///
    /// Each read runs on its own task, so a panic in one metric only costs
    /// that metric. `package` pins the monitored app; without it the source
    /// is asked for the foreground package. When the layer lookup fails,
    /// FPS is read from `cached_layer` instead.
    pub(crate) async fn fetch(
        source: Arc<dyn DeviceSource>,
        package: Option<String>,
        cached_layer: Option<String>,
    ) -> Self {
        let package = match package {
            Some(package) => Ok(Some(package)),
            None => read(&source, "package", |s| async move { s.foreground_package().await }).await,
        };

        let layer = match &package {
            Ok(Some(package)) => {
                let package = package.clone();
                read(&source, "layer", |s| async move { s.foreground_layer(&package).await }).await
            }
            Ok(None) => Ok(None),
            Err(_) => Err(SourceError::Unavailable("foreground package")),
        };

        let fps_layer = match &layer {
            Ok(layer) => layer.clone(),
            Err(_) => cached_layer,
        };
        let fps = match fps_layer {
            Some(layer) => read(&source, "fps", |s| async move {
                s.frame_timestamps(&layer)
                    .await
                    .map(|timestamps| fps_from_timestamps(&timestamps))
            })
            .await,
            None => Ok(FPS_UNAVAILABLE),
        };

        Self {
            package,
            layer,
            fps,
            gpu_percent: read(&source, "gpu", |s| async move { s.gpu_percent().await }).await,
            temperature: read(&source, "temperature", |s| async move { s.temperature().await })
                .await,
            memory_percent: read(&source, "memory", |s| async move { s.memory_percent().await })
                .await,
            power: read(&source, "power", |s| async move { s.power_reading().await }).await,
            refresh_rate_hz: read(&source, "refresh_rate", |s| async move {
                s.refresh_rate_hz().await
            })
            .await,
            device_name: read(&source, "device_name", |s| async move { s.device_name().await })
                .await,
            device_ip: read(&source, "device_ip", |s| async move { s.device_ip().await }).await,
        }
    }
}

/// Read one metric from its own clone of the source
async fn read<T, F, Fut>(
    source: &Arc<dyn DeviceSource>,
    metric: &'static str,
    fetch: F,
) -> SourceResult<T>
where
    T: Send + 'static,
    F: FnOnce(Arc<dyn DeviceSource>) -> Fut,
    Fut: Future<Output = SourceResult<T>> + Send + 'static,
{
    guarded(metric, fetch(Arc::clone(source))).await
}

/// Slow metric values owned by the sampler, refreshed every slow interval
#[derive(Debug, Default)]
pub struct SlowMetricCache {
    values: SlowMetrics,
    last_fetch: Option<Instant>,
}

impl SlowMetricCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &SlowMetrics {
        &self.values
    }

    pub fn last_fetch(&self) -> Option<Instant> {
        self.last_fetch
    }

    /// Whether at least `interval` has passed since the last slow poll
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        match self.last_fetch {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        }
    }

    /// Merge a poll into the cache
    ///
    /// Successful reads replace the cached value; failed reads keep it. The
    /// failures are returned by metric name so the caller can report them.
    pub(crate) fn apply(&mut self, fetch: SlowFetch, now: Instant) -> Vec<(&'static str, SourceError)> {
        let mut failures = Vec::new();
        let values = &mut self.values;

        merge(&mut values.package, fetch.package, "package", &mut failures);
        merge(&mut values.layer, fetch.layer, "layer", &mut failures);
        merge(&mut values.fps, fetch.fps, "fps", &mut failures);
        merge(&mut values.gpu_percent, fetch.gpu_percent, "gpu", &mut failures);
        merge(&mut values.temperature, fetch.temperature, "temperature", &mut failures);
        merge(&mut values.memory_percent, fetch.memory_percent, "memory", &mut failures);
        merge(&mut values.refresh_rate_hz, fetch.refresh_rate_hz, "refresh_rate", &mut failures);
        merge(&mut values.device_name, fetch.device_name, "device_name", &mut failures);
        merge(&mut values.device_ip, fetch.device_ip, "device_ip", &mut failures);

        match fetch.power {
            Ok(reading) => values.power = reading.unwrap_or_default(),
            Err(e) => failures.push(("power", e)),
        }

        self.last_fetch = Some(now);
        failures
    }
}

fn merge<T>(
    slot: &mut T,
    result: SourceResult<T>,
    metric: &'static str,
    failures: &mut Vec<(&'static str, SourceError)>,
) {
    match result {
        Ok(value) => *slot = value,
        Err(e) => failures.push((metric, e)),
    }
}
