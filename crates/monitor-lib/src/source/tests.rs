//! Tests for the procfs source against a fake kernel tree
//!
//! Every test builds its own `/proc` and `/sys` layout in a temp directory
//! so no real host files are read.

#[cfg(test)]
mod mock_procfs_tests {
    use crate::calc::{CpuBaseline, CpuObservation};
    use crate::error::SourceError;
    use crate::models::CoreCounters;
    use crate::source::{DeviceSource, ProcfsSource};
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::fs;

    async fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(path, content).await.unwrap();
    }

    /// Two cores with cpufreq, thermal zone, meminfo and a battery
    async fn create_mock_tree(temp_dir: &TempDir) -> ProcfsSource {
        let root = temp_dir.path();

        write(
            root,
            "proc/stat",
            "cpu  400 0 100 500 0 0 0 0 0 0
cpu0 200 0 50 250 0 0 0 0 0 0
cpu1 200 0 50 250 0 0 0 0 0 0
intr 1 2 3
",
        )
        .await;
        write(root, "sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq", "1800000\n").await;
        write(root, "sys/devices/system/cpu/cpu1/cpufreq/scaling_cur_freq", "2400000\n").await;
        write(root, "sys/class/thermal/thermal_zone0/temp", "42500\n").await;
        write(
            root,
            "proc/meminfo",
            "MemTotal: 4000000 kB\nMemFree: 1000000 kB\nMemAvailable: 3000000 kB\n",
        )
        .await;
        write(root, "sys/class/power_supply/BAT0/voltage_now", "4000000\n").await;
        write(root, "sys/class/power_supply/BAT0/current_now", "-500000\n").await;
        write(root, "proc/sys/kernel/hostname", "bench-rig\n").await;
        write(
            root,
            "proc/net/fib_trie",
            "Main:\n  |-- 10.1.2.3\n     /32 host LOCAL\n",
        )
        .await;

        ProcfsSource::with_root(root)
    }

    #[tokio::test]
    async fn test_cpu_counters_and_frequencies() {
        let temp_dir = TempDir::new().unwrap();
        let source = create_mock_tree(&temp_dir).await;

        let counters = source.cpu_counters().await.unwrap();
        assert_eq!(counters.len(), 3);
        assert_eq!(counters[1], CoreCounters::new(500, 250));

        let freqs = source.cpu_frequencies().await.unwrap();
        assert_eq!(freqs, vec![1800.0, 2400.0]);
    }

    #[tokio::test]
    async fn test_usage_from_two_reads() {
        let temp_dir = TempDir::new().unwrap();
        let source = create_mock_tree(&temp_dir).await;
        let mut baseline = CpuBaseline::new();

        let first = baseline.observe(source.cpu_counters().await.unwrap());
        assert_eq!(first, CpuObservation::Baseline { cores: 2 });

        // cpu0 busy for 75 of 100 new ticks, cpu1 idle throughout
        write(
            temp_dir.path(),
            "proc/stat",
            "cpu  475 0 100 525 0 0 0 0 0 0
cpu0 275 0 50 275 0 0 0 0 0 0
cpu1 200 0 50 350 0 0 0 0 0 0
",
        )
        .await;

        let second = baseline.observe(source.cpu_counters().await.unwrap());
        assert_eq!(second, CpuObservation::Usage(vec![75.0, 0.0]));
    }

    #[tokio::test]
    async fn test_slow_metrics() {
        let temp_dir = TempDir::new().unwrap();
        let source = create_mock_tree(&temp_dir).await;

        assert_eq!(source.temperature().await.unwrap(), 42.5);
        assert_eq!(source.memory_percent().await.unwrap(), 25.0);
        assert_eq!(source.device_name().await.unwrap(), "bench-rig");
        assert_eq!(source.device_ip().await.unwrap(), "10.1.2.3");
        // No GPU node: reads as idle rather than failing
        assert_eq!(source.gpu_percent().await.unwrap(), 0.0);

        let power = source.power_reading().await.unwrap().unwrap();
        assert_eq!(power.volts, 4.0);
        assert_eq!(power.milliamps, -500.0);
        assert_eq!(power.milliwatts, -2000.0);
    }

    #[tokio::test]
    async fn test_power_now_overrides_derived_power() {
        let temp_dir = TempDir::new().unwrap();
        let source = create_mock_tree(&temp_dir).await;
        write(temp_dir.path(), "sys/class/power_supply/BAT0/power_now", "1500000\n").await;

        let power = source.power_reading().await.unwrap().unwrap();
        assert_eq!(power.milliwatts, 1500.0);
    }

    #[tokio::test]
    async fn test_missing_battery_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = create_mock_tree(&temp_dir)
            .await
            .with_power_supply("no-such-supply");

        assert!(source.power_reading().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_compositor() {
        let temp_dir = TempDir::new().unwrap();
        let source = create_mock_tree(&temp_dir).await;

        assert!(source.foreground_package().await.unwrap().is_none());
        assert!(source.foreground_layer("com.game").await.unwrap().is_none());
        assert!(matches!(
            source.vsync_triplets("layer").await,
            Err(SourceError::Unavailable(_))
        ));
        assert_eq!(source.refresh_rate_hz().await.unwrap(), 60.0);
    }

    #[tokio::test]
    async fn test_missing_files_report_paths() {
        let temp_dir = TempDir::new().unwrap();
        let source = ProcfsSource::with_root(temp_dir.path());

        match source.cpu_counters().await {
            Err(SourceError::Io { path, .. }) => assert!(path.ends_with("proc/stat")),
            other => panic!("expected io error, got {:?}", other),
        }
        assert!(source.temperature().await.is_err());
        assert!(source.cpu_frequencies().await.unwrap().is_empty());
        assert_eq!(source.device_ip().await.unwrap(), "");
    }
}
