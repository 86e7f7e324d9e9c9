//! Core data models for the sampling engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of CPU cores tracked by the history store and persisted records
pub const TRACKED_CORES: usize = 8;

/// Cumulative tick counters for one `cpu` line of the kernel statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreCounters {
    pub total: u64,
    pub idle: u64,
}

impl CoreCounters {
    pub fn new(total: u64, idle: u64) -> Self {
        Self { total, idle }
    }
}

/// One frame's journey through the display pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VsyncTriplet {
    pub sequence: i64,
    pub requested_ns: i64,
    pub present_ns: i64,
}

impl VsyncTriplet {
    /// Marker the compositor writes for frames that have not been presented yet
    pub const PENDING: i64 = i64::MAX;

    pub fn new(sequence: i64, requested_ns: i64, present_ns: i64) -> Self {
        Self {
            sequence,
            requested_ns,
            present_ns,
        }
    }

    /// Whether the present timestamp refers to a frame that reached the screen
    pub fn is_presented(&self) -> bool {
        self.present_ns > 0 && self.present_ns != Self::PENDING
    }
}

/// Battery power telemetry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerReading {
    pub milliwatts: f64,
    pub volts: f64,
    pub milliamps: f64,
}

impl PowerReading {
    /// Build a reading from voltage and current, deriving the power draw
    pub fn from_volts_milliamps(volts: f64, milliamps: f64) -> Self {
        Self {
            milliwatts: volts * milliamps,
            volts,
            milliamps,
        }
    }
}

/// One tick's worth of device metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Seconds since the sampler started
    pub elapsed_secs: f64,
    /// Per-core utilization in percent, empty or zero on the first tick
    pub usages: Vec<f64>,
    /// Per-core frequency in MHz
    pub freqs: Vec<f64>,
    /// Frames per second, -1 when undeterminable
    pub fps: f64,
    pub temperature: f64,
    pub memory_percent: f64,
    pub gpu_percent: f64,
    pub power: PowerReading,
    pub refresh_rate_hz: f64,
    pub jank: u32,
    pub big_jank: u32,
    pub device_name: String,
    pub device_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RawSnapshot {
    /// Snapshot for a tick that could not be assembled
    pub fn failed(elapsed_secs: f64, error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            elapsed_secs,
            usages: Vec::new(),
            freqs: Vec::new(),
            fps: -1.0,
            temperature: 0.0,
            memory_percent: 0.0,
            gpu_percent: 0.0,
            power: PowerReading::default(),
            refresh_rate_hz: 0.0,
            jank: 0,
            big_jank: 0,
            device_name: String::new(),
            device_ip: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// True once the CPU calculator has produced real (non-baseline) data
    pub fn has_cpu_data(&self) -> bool {
        self.usages.iter().chain(self.freqs.iter()).any(|v| *v > 0.0)
    }

    /// Value of a scalar metric as shown on the display surface
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Fps => self.fps,
            Metric::Temperature => self.temperature,
            Metric::Memory => self.memory_percent,
            Metric::Power => self.power.milliwatts.abs(),
            Metric::Gpu => self.gpu_percent,
        }
    }
}

/// Scalar metrics carried by every snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Fps,
    Temperature,
    Memory,
    Power,
    Gpu,
}

impl Metric {
    /// Fixed persisted order of scalar metrics
    pub const ALL: [Metric; 5] = [
        Metric::Fps,
        Metric::Temperature,
        Metric::Memory,
        Metric::Power,
        Metric::Gpu,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Fps => "fps",
            Metric::Temperature => "temp",
            Metric::Memory => "mem",
            Metric::Power => "power",
            Metric::Gpu => "gpu",
        }
    }
}

/// Identifies one history series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKey {
    Scalar(Metric),
    CoreUsage(usize),
    CoreFreq(usize),
}

impl SeriesKey {
    /// Every series the history store keeps
    pub fn all() -> Vec<SeriesKey> {
        let mut keys: Vec<SeriesKey> = Metric::ALL.iter().copied().map(SeriesKey::Scalar).collect();
        keys.extend((0..TRACKED_CORES).map(SeriesKey::CoreUsage));
        keys.extend((0..TRACKED_CORES).map(SeriesKey::CoreFreq));
        keys
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKey::Scalar(metric) => f.write_str(metric.name()),
            SeriesKey::CoreUsage(core) => write!(f, "cpu_usage_{}", core),
            SeriesKey::CoreFreq(core) => write!(f, "cpu_freq_{}", core),
        }
    }
}

impl FromStr for SeriesKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(metric) = Metric::ALL.iter().find(|m| m.name() == s) {
            return Ok(SeriesKey::Scalar(*metric));
        }

        let core_index = |rest: &str| -> Result<usize, String> {
            let core: usize = rest.parse().map_err(|_| format!("invalid core index in {}", s))?;
            if core >= TRACKED_CORES {
                return Err(format!("core {} is not tracked", core));
            }
            Ok(core)
        };

        if let Some(rest) = s.strip_prefix("cpu_usage_") {
            return core_index(rest).map(SeriesKey::CoreUsage);
        }
        if let Some(rest) = s.strip_prefix("cpu_freq_") {
            return core_index(rest).map(SeriesKey::CoreFreq);
        }

        Err(format!("unknown series {}", s))
    }
}
