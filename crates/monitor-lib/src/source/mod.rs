//! Device data sources
//!
//! The sampler reads everything through [`DeviceSource`]. Implementations
//! decide how a device is reached; this crate ships [`ProcfsSource`], which
//! reads a procfs/sysfs tree, and the text parsers shared by sources that
//! receive kernel or compositor dumps.

pub mod parse;
mod procfs;

#[cfg(test)]
mod tests;

pub use procfs::{ProcfsSource, DEFAULT_POWER_SUPPLY};

use crate::error::SourceResult;
use crate::models::{CoreCounters, PowerReading, VsyncTriplet};

pub use async_trait::async_trait;

/// Capability surface of a device the sampler can poll
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// Cumulative `(total, idle)` ticks, aggregate line first
    async fn cpu_counters(&self) -> SourceResult<Vec<CoreCounters>>;

    /// Per-core frequency in MHz, ending at the first core without a reading
    async fn cpu_frequencies(&self) -> SourceResult<Vec<f64>>;

    /// Package currently in the foreground, if the device can tell
    async fn foreground_package(&self) -> SourceResult<Option<String>> {
        Ok(None)
    }

    /// Compositor layer that renders `package`
    async fn foreground_layer(&self, package: &str) -> SourceResult<Option<String>>;

    /// Frame timing triplets recorded for `layer`
    async fn vsync_triplets(&self, layer: &str) -> SourceResult<Vec<VsyncTriplet>>;

    /// Frame publish timestamps (ns) for `layer`
    async fn frame_timestamps(&self, layer: &str) -> SourceResult<Vec<i64>> {
        let triplets = self.vsync_triplets(layer).await?;
        Ok(triplets
            .iter()
            .filter(|t| t.requested_ns > 0 && t.requested_ns != VsyncTriplet::PENDING)
            .map(|t| t.requested_ns)
            .collect())
    }

    async fn refresh_rate_hz(&self) -> SourceResult<f64>;

    async fn power_reading(&self) -> SourceResult<Option<PowerReading>>;

    /// Temperature in degrees Celsius
    async fn temperature(&self) -> SourceResult<f64>;

    async fn memory_percent(&self) -> SourceResult<f64>;

    async fn gpu_percent(&self) -> SourceResult<f64>;

    async fn device_name(&self) -> SourceResult<String>;

    async fn device_ip(&self) -> SourceResult<String>;
}
