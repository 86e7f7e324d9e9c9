//! Frames-per-second from frame publish timestamps

/// Returned when no frame rate can be determined
pub const FPS_UNAVAILABLE: f64 = -1.0;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Average frame rate over a monotonic list of timestamps (ns)
pub fn fps_from_timestamps(timestamps: &[i64]) -> f64 {
    let (first, last) = match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) if timestamps.len() >= 2 => (*first, *last),
        _ => return FPS_UNAVAILABLE,
    };

    let interval = last - first;
    if interval <= 0 {
        return FPS_UNAVAILABLE;
    }

    (NANOS_PER_SEC * (timestamps.len() - 1) as f64 / interval as f64).round()
}
