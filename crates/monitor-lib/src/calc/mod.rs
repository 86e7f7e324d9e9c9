//! Metric calculators
//!
//! Pure functions and small state objects that turn raw device samples into
//! per-tick CPU utilization, frames-per-second and jank counts.

mod cpu;
mod fps;
mod jank;

pub use cpu::{core_usage, CpuBaseline, CpuObservation};
pub use fps::{fps_from_timestamps, FPS_UNAVAILABLE};
pub use jank::{
    detect_jank, detect_jank_dropped_frames, present_timestamps, refresh_period_ns, JankCount,
    JankRule, JankTracker, BIG_JANK_THRESHOLD_NS, DEFAULT_REFRESH_RATE_HZ, JANK_THRESHOLD_NS,
    MIN_NEW_TRIPLETS, MIN_TIMESTAMPS,
};
