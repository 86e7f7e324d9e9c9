//! Sampling-and-derivation engine for device performance monitoring
//!
//! This crate provides the core functionality for:
//! - Polling a device data source at a fast and a slow cadence
//! - Deriving CPU utilization, FPS and jank counts from raw counters
//! - Aggregating per-tick snapshots into one-second records
//! - Keeping a fixed-capacity history window for live display
//! - Health checks and observability

pub mod aggregate;
pub mod calc;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod sampler;
pub mod session;
pub mod source;

pub use aggregate::{AggregatedRecord, Aggregator, FlushClock, RecordLog, RecordLogStats};
pub use error::{SamplerError, SourceError, SourceResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use history::{HistoryPoint, HistorySeries, HistoryStore};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use sampler::{Sampler, SamplerBuilder, SamplerConfig, SamplerHandle, SlowMetrics};
pub use session::{JankTotals, MonitorSession, SessionConfig, SessionView};
pub use source::{DeviceSource, ProcfsSource};
