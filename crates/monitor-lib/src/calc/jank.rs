//! Jank and big-jank detection from vsync present timestamps
//!
//! The adaptive-baseline rule compares every frame time against the mean of
//! the three frames before it. A frame is jank when it took more than twice
//! that mean and more than two refresh periods at 60 Hz; big jank when it
//! also exceeded three refresh periods.

use crate::models::VsyncTriplet;
use serde::{Deserialize, Serialize};

/// Refresh rate assumed when the device does not report one
pub const DEFAULT_REFRESH_RATE_HZ: f64 = 60.0;

/// Two missed frames at 60 Hz, independent of the live refresh rate
pub const JANK_THRESHOLD_NS: i64 = 33_333_333;

/// Three missed frames at 60 Hz
pub const BIG_JANK_THRESHOLD_NS: i64 = 50_000_000;

/// Minimum present timestamps before the detector evaluates anything
///
/// A frame needs three earlier frame times as its baseline, so the first
/// frame that can be judged ends at the fifth timestamp.
pub const MIN_TIMESTAMPS: usize = 4;

/// Minimum unseen triplets before the tracker runs the detector
pub const MIN_NEW_TRIPLETS: usize = 4;

/// Already-evaluated timestamps the tracker keeps as baseline for the next window
const CONTEXT_TIMESTAMPS: usize = 4;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Jank counts over one detection window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JankCount {
    pub jank: u32,
    pub big_jank: u32,
}

/// Which detection formula to apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JankRule {
    /// Frame time against the mean of the previous three frames
    #[default]
    AdaptiveBaseline,
    /// Dropped frames estimated from the refresh period
    DroppedFrames,
}

impl JankRule {
    pub fn detect(&self, timestamps: &[i64], refresh_rate_hz: f64) -> JankCount {
        self.detect_from(timestamps, refresh_rate_hz, 0)
    }

    /// Count only frames ending at or after `timestamps[first_new]`
    ///
    /// Earlier timestamps serve as baseline without being counted again.
    pub fn detect_from(
        &self,
        timestamps: &[i64],
        refresh_rate_hz: f64,
        first_new: usize,
    ) -> JankCount {
        match self {
            JankRule::AdaptiveBaseline => adaptive(timestamps, first_new),
            JankRule::DroppedFrames => {
                dropped_frames(timestamps, refresh_period_ns(refresh_rate_hz), first_new)
            }
        }
    }
}

/// Expected refresh period in nanoseconds, 60 Hz when unknown
pub fn refresh_period_ns(refresh_rate_hz: f64) -> f64 {
    let hz = if refresh_rate_hz.is_finite() && refresh_rate_hz > 0.0 {
        refresh_rate_hz
    } else {
        DEFAULT_REFRESH_RATE_HZ
    };
    NANOS_PER_SEC / hz
}

/// Present timestamps of frames that actually reached the screen, in order
pub fn present_timestamps(triplets: &[VsyncTriplet]) -> Vec<i64> {
    triplets
        .iter()
        .filter(|t| t.is_presented())
        .map(|t| t.present_ns)
        .collect()
}

/// Adaptive-baseline detector
pub fn detect_jank(timestamps: &[i64]) -> JankCount {
    adaptive(timestamps, 0)
}

fn adaptive(timestamps: &[i64], first_new: usize) -> JankCount {
    let mut count = JankCount::default();
    if timestamps.len() < MIN_TIMESTAMPS {
        return count;
    }

    let frame_times: Vec<i64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();

    // Frame k ends at timestamps[k + 1]
    for k in 3.max(first_new.saturating_sub(1))..frame_times.len() {
        let current = frame_times[k];
        let baseline = (frame_times[k - 1] + frame_times[k - 2] + frame_times[k - 3]) as f64 / 3.0;

        if current as f64 > 2.0 * baseline && current > JANK_THRESHOLD_NS {
            count.jank += 1;
            if current > BIG_JANK_THRESHOLD_NS {
                count.big_jank += 1;
            }
        }
    }

    count
}

/// Legacy detector based on the number of refresh periods between frames
pub fn detect_jank_dropped_frames(timestamps: &[i64], refresh_period_ns: f64) -> JankCount {
    dropped_frames(timestamps, refresh_period_ns, 0)
}

fn dropped_frames(timestamps: &[i64], refresh_period_ns: f64, first_new: usize) -> JankCount {
    let mut count = JankCount::default();
    if timestamps.len() < 2 || refresh_period_ns <= 0.0 {
        return count;
    }

    let skip = first_new.saturating_sub(1);
    for pair in timestamps.windows(2).skip(skip) {
        let interval = (pair[1] - pair[0]) as f64;
        let dropped = (interval / refresh_period_ns).round() - 1.0;

        if dropped > 6.66 {
            count.jank += 1;
        }
        if dropped >= 8.0 {
            count.big_jank += 1;
        }
    }

    count
}

/// Runs the detector only over frames it has not seen yet
///
/// The last few evaluated timestamps are kept so the first new frames of a
/// window are judged against real history, including the gap from the last
/// seen frame to the first new one.
#[derive(Debug, Clone, Default)]
pub struct JankTracker {
    rule: JankRule,
    recent: Vec<i64>,
}

impl JankTracker {
    pub fn new(rule: JankRule) -> Self {
        Self {
            rule,
            recent: Vec::with_capacity(CONTEXT_TIMESTAMPS),
        }
    }

    pub fn last_present_ns(&self) -> Option<i64> {
        self.recent.last().copied()
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }

    /// Count jank among triplets presented after the last evaluated one
    ///
    /// With fewer than [`MIN_NEW_TRIPLETS`] fresh frames the window is left
    /// pending for the next call and a zero count is returned.
    pub fn update(&mut self, triplets: &[VsyncTriplet], refresh_rate_hz: f64) -> JankCount {
        let last = self.last_present_ns();
        let fresh: Vec<i64> = present_timestamps(triplets)
            .into_iter()
            .filter(|ts| last.map_or(true, |last| *ts > last))
            .collect();

        if fresh.len() < MIN_NEW_TRIPLETS {
            return JankCount::default();
        }

        let mut window = std::mem::take(&mut self.recent);
        let first_new = window.len();
        window.extend(fresh);

        let count = self.rule.detect_from(&window, refresh_rate_hz, first_new);

        let keep_from = window.len().saturating_sub(CONTEXT_TIMESTAMPS);
        self.recent = window.split_off(keep_from);
        count
    }
}
