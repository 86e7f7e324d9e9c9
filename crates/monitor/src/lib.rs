//! Perf Monitor service: configuration, HTTP pull API and CSV export
//! around a [`monitor_lib::MonitorSession`].

pub mod api;
pub mod config;
pub mod export;
