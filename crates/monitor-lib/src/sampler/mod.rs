//! Multi-rate sampling of a device source
//!
//! One task polls CPU counters and frequencies every tick, refreshes the
//! slow metrics on their own cadence and checks for jank on a third one.
//! Each tick produces exactly one [`RawSnapshot`](crate::models::RawSnapshot)
//! on a bounded channel, or nothing at all once a stop was requested.

mod cache;
mod r#loop;
mod task;

pub use cache::{SlowMetricCache, SlowMetrics};
pub use r#loop::{Sampler, SamplerBuilder, SamplerConfig, SamplerHandle};
