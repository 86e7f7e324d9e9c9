//! Monitor configuration

use anyhow::{Context, Result};
use monitor_lib::{SamplerConfig, SessionConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Monitor configuration
///
/// Loaded from an optional config file, then overridden by environment
/// variables prefixed with `PERFMON_` (for example `PERFMON_TICK_INTERVAL_MS`).
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Label attached to structured log events
    #[serde(default = "default_device_label")]
    pub device_label: String,

    /// API server port for health/metrics/pull endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Package to watch; the foreground app when unset
    #[serde(default)]
    pub package: Option<String>,

    /// Root the procfs source reads `/proc` and `/sys` below
    #[serde(default = "default_procfs_root")]
    pub procfs_root: PathBuf,

    /// Power supply under `/sys/class/power_supply`
    #[serde(default = "default_power_supply")]
    pub power_supply: String,

    /// Fast tick interval in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Slow metric refresh interval in milliseconds
    #[serde(default = "default_slow_interval")]
    pub slow_interval_ms: u64,

    /// Jank check interval in milliseconds
    #[serde(default = "default_jank_interval")]
    pub jank_interval_ms: u64,

    /// Aggregation bucket length in milliseconds
    #[serde(default = "default_bucket_interval")]
    pub bucket_interval_ms: u64,

    /// Snapshots buffered between sampler and consumer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// CSV file written with every retained record at shutdown
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

fn default_device_label() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "device".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_procfs_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_power_supply() -> String {
    "BAT0".to_string()
}

fn default_tick_interval() -> u64 {
    500
}

fn default_slow_interval() -> u64 {
    2000
}

fn default_jank_interval() -> u64 {
    1000
}

fn default_bucket_interval() -> u64 {
    1000
}

fn default_buffer_size() -> usize {
    16
}

fn default_history_capacity() -> usize {
    2000
}

fn default_max_records() -> usize {
    86_400
}

impl MonitorConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("PERFMON"))
            .build()
            .context("Failed to read configuration")?;

        let config: MonitorConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 || self.slow_interval_ms == 0 || self.jank_interval_ms == 0 {
            anyhow::bail!("Sampling intervals must be greater than zero");
        }
        if self.bucket_interval_ms == 0 {
            anyhow::bail!("Bucket interval must be greater than zero");
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sampler: SamplerConfig {
                interval: Duration::from_millis(self.tick_interval_ms),
                slow_interval: Duration::from_millis(self.slow_interval_ms),
                jank_interval: Duration::from_millis(self.jank_interval_ms),
                buffer_size: self.buffer_size,
                package: self.package.clone(),
                ..SamplerConfig::default()
            },
            bucket_interval: Duration::from_millis(self.bucket_interval_ms),
            max_records: self.max_records,
            history_capacity: self.history_capacity,
            label: self.device_label.clone(),
            ..SessionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
device_label = "pixel-7"
package = "com.example.game"
tick_interval_ms = 250
export_path = "/tmp/run.csv"
"#,
        );

        let config = MonitorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.device_label, "pixel-7");
        assert_eq!(config.package.as_deref(), Some("com.example.game"));
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.slow_interval_ms, 2000);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.export_path, Some(PathBuf::from("/tmp/run.csv")));

        let session = config.session_config();
        assert_eq!(session.sampler.interval, Duration::from_millis(250));
        assert_eq!(session.sampler.slow_interval, Duration::from_secs(2));
        assert_eq!(session.bucket_interval, Duration::from_secs(1));
        assert_eq!(session.label, "pixel-7");
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let file = write_config("tick_interval_ms = 0\n");
        assert!(MonitorConfig::load(Some(file.path())).is_err());

        let file = write_config("bucket_interval_ms = 0\n");
        assert!(MonitorConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = MonitorConfig::load(Some(Path::new("/nonexistent/perf-monitor.toml")));
        assert!(result.is_err());
    }
}
