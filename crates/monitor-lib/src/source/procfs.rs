//! Device source backed by a procfs/sysfs tree
//!
//! Reads the host's own kernel interfaces:
//! - /proc/stat for cumulative per-core ticks
//! - cpufreq scaling_cur_freq for per-core frequency
//! - /proc/meminfo, thermal_zone0 and the power supply class for slow metrics
//!
//! There is no compositor behind this source, so no layer is ever resolved
//! and frame metrics stay at their "unavailable" values.

use super::parse;
use super::DeviceSource;
use crate::calc::DEFAULT_REFRESH_RATE_HZ;
use crate::error::{SourceError, SourceResult};
use crate::models::{CoreCounters, PowerReading, VsyncTriplet};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tokio::fs;

/// Power supply read when none is configured
pub const DEFAULT_POWER_SUPPLY: &str = "BAT0";

/// Source reading `/proc` and `/sys` below a configurable root
pub struct ProcfsSource {
    root: PathBuf,
    power_supply: String,
    charge: Mutex<ChargeRateEstimator>,
}

impl ProcfsSource {
    /// Create a source for the running host
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Create a source rooted somewhere else (for testing or chroots)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            power_supply: DEFAULT_POWER_SUPPLY.to_string(),
            charge: Mutex::new(ChargeRateEstimator::default()),
        }
    }

    /// Read battery data from `/sys/class/power_supply/<name>`
    pub fn with_power_supply(mut self, name: impl Into<String>) -> Self {
        self.power_supply = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    async fn read(&self, relative: &str) -> SourceResult<String> {
        let path = self.path(relative);
        fs::read_to_string(&path)
            .await
            .map_err(|e| SourceError::io(path, e))
    }

    /// Read a file that legitimately may not exist on this host
    async fn read_optional(&self, relative: &str) -> SourceResult<Option<String>> {
        match self.read(relative).await {
            Ok(content) => Ok(Some(content)),
            Err(SourceError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn supply_file(&self, file: &str) -> String {
        format!("sys/class/power_supply/{}/{}", self.power_supply, file)
    }
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceSource for ProcfsSource {
    async fn cpu_counters(&self) -> SourceResult<Vec<CoreCounters>> {
        let content = self.read("proc/stat").await?;
        parse::parse_proc_stat(&content)
    }

    async fn cpu_frequencies(&self) -> SourceResult<Vec<f64>> {
        let mut freqs = Vec::new();

        for core in 0.. {
            let relative = format!("sys/devices/system/cpu/cpu{}/cpufreq/scaling_cur_freq", core);
            let content = match self.read_optional(&relative).await? {
                Some(content) => content,
                None => break,
            };

            match parse::parse_frequency_khz(&content) {
                Some(mhz) => freqs.push(mhz),
                None => break,
            }
        }

        Ok(freqs)
    }

    async fn foreground_layer(&self, _package: &str) -> SourceResult<Option<String>> {
        Ok(None)
    }

    async fn vsync_triplets(&self, _layer: &str) -> SourceResult<Vec<VsyncTriplet>> {
        Err(SourceError::Unavailable("vsync triplets"))
    }

    async fn refresh_rate_hz(&self) -> SourceResult<f64> {
        Ok(DEFAULT_REFRESH_RATE_HZ)
    }

    async fn power_reading(&self) -> SourceResult<Option<PowerReading>> {
        let voltage = match self.read_optional(&self.supply_file("voltage_now")).await? {
            Some(content) => parse::parse_scaled(&content, "voltage_now", 1_000_000.0)?,
            None => return Ok(None),
        };

        let milliamps = match self.read_optional(&self.supply_file("current_now")).await? {
            Some(content) => parse::parse_scaled(&content, "current_now", 1000.0)?,
            None => match self.read_optional(&self.supply_file("charge_now")).await? {
                Some(content) => {
                    let charge_mah = parse::parse_scaled(&content, "charge_now", 1000.0)?;
                    let mut estimator = self.charge.lock().unwrap_or_else(|e| e.into_inner());
                    estimator.update(charge_mah, Instant::now())
                }
                None => 0.0,
            },
        };

        let mut reading = PowerReading::from_volts_milliamps(voltage, milliamps);
        if let Some(content) = self.read_optional(&self.supply_file("power_now")).await? {
            reading.milliwatts = parse::parse_scaled(&content, "power_now", 1000.0)?;
        }

        Ok(Some(reading))
    }

    async fn temperature(&self) -> SourceResult<f64> {
        let content = self.read("sys/class/thermal/thermal_zone0/temp").await?;
        parse::parse_scaled(&content, "temperature", 1000.0)
    }

    async fn memory_percent(&self) -> SourceResult<f64> {
        let content = self.read("proc/meminfo").await?;
        parse::parse_meminfo(&content)
    }

    async fn gpu_percent(&self) -> SourceResult<f64> {
        match self
            .read_optional("sys/class/drm/card0/device/gpu_busy_percent")
            .await?
        {
            Some(content) => parse::parse_scaled(&content, "gpu_busy_percent", 1.0),
            None => Ok(0.0),
        }
    }

    async fn device_name(&self) -> SourceResult<String> {
        let content = self.read("proc/sys/kernel/hostname").await?;
        Ok(content.trim().to_string())
    }

    async fn device_ip(&self) -> SourceResult<String> {
        let content = self.read_optional("proc/net/fib_trie").await?;
        Ok(content
            .as_deref()
            .and_then(parse::parse_fib_trie_local)
            .unwrap_or_default())
    }
}

/// Derives current draw from successive charge counter readings
#[derive(Debug, Default)]
struct ChargeRateEstimator {
    last: Option<(f64, Instant)>,
}

impl ChargeRateEstimator {
    /// Current in mA since the previous reading, 0 on the first one
    fn update(&mut self, charge_mah: f64, at: Instant) -> f64 {
        let current = match self.last {
            Some((last_charge, last_at)) => {
                let hours = at.duration_since(last_at).as_secs_f64() / 3600.0;
                if hours > 0.0 {
                    ((charge_mah - last_charge) / hours).abs()
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        self.last = Some((charge_mah, at));
        current
    }
}
