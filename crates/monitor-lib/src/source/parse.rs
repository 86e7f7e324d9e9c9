//! Parsers for kernel and compositor text dumps
//!
//! The kernel parsers back [`ProcfsSource`](super::ProcfsSource). The
//! SurfaceFlinger parsers (`parse_latency_dump`, `parse_refresh_rate`,
//! `find_target_layer`) are for sources that can reach a compositor, such
//! as one driving `dumpsys` on an attached device; the procfs source has
//! none and does not call them.

use crate::error::{SourceError, SourceResult};
use crate::models::{CoreCounters, VsyncTriplet};
use std::collections::HashMap;

/// Parse the `cpu*` lines at the top of `/proc/stat`
///
/// Total is the sum of the user, nice, system and idle columns; idle is the
/// fourth column. Parsing stops at the first line that is not a cpu line.
pub fn parse_proc_stat(content: &str) -> SourceResult<Vec<CoreCounters>> {
    let mut counters = Vec::new();

    for line in content.lines() {
        if !line.starts_with("cpu") {
            break;
        }

        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(4)
            .map(|f| f.parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|_| SourceError::parse("cpu counters", line))?;

        if fields.len() < 4 {
            return Err(SourceError::parse("cpu counters", line));
        }

        counters.push(CoreCounters::new(fields.iter().sum(), fields[3]));
    }

    if counters.is_empty() {
        return Err(SourceError::Unavailable("cpu counters"));
    }

    Ok(counters)
}

/// Parse a `scaling_cur_freq` value (kHz) into MHz
///
/// Returns `None` for an empty read, which ends core enumeration. A value
/// that is present but not numeric reads as 0.
pub fn parse_frequency_khz(content: &str) -> Option<f64> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(trimmed.parse::<u64>().map(|khz| khz as f64 / 1000.0).unwrap_or(0.0))
}

/// Memory in use as a percentage of `MemTotal`, from `/proc/meminfo`
pub fn parse_meminfo(content: &str) -> SourceResult<f64> {
    let mut fields: HashMap<&str, u64> = HashMap::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            if let Ok(value) = parts[1].parse::<u64>() {
                fields.insert(parts[0].trim_end_matches(':'), value);
            }
        }
    }

    let total = match fields.get("MemTotal") {
        Some(total) if *total > 0 => *total as f64,
        _ => return Err(SourceError::Unavailable("MemTotal")),
    };
    let available = fields.get("MemAvailable").copied().unwrap_or(0) as f64;

    Ok(((total - available) / total * 100.0).clamp(0.0, 100.0))
}

/// Parse a single integer sysfs value and divide it by `divisor`
///
/// Used for millidegree temperatures and micro-unit power supply readings.
pub fn parse_scaled(content: &str, what: &'static str, divisor: f64) -> SourceResult<f64> {
    content
        .trim()
        .parse::<i64>()
        .map(|raw| raw as f64 / divisor)
        .map_err(|_| SourceError::parse(what, content.trim()))
}

/// Frame triplets from a `dumpsys SurfaceFlinger --latency <layer>` dump
///
/// The first line (refresh period) and malformed rows are skipped, as are
/// frames whose present time is 0 or still pending.
pub fn parse_latency_dump(content: &str) -> Vec<VsyncTriplet> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 3 {
                return None;
            }

            let sequence = parts[0].parse::<i64>().ok()?;
            let requested_ns = parts[1].parse::<i64>().ok()?;
            let present_ns = parts[2].parse::<i64>().ok()?;
            let triplet = VsyncTriplet::new(sequence, requested_ns, present_ns);

            triplet.is_presented().then_some(triplet)
        })
        .collect()
}

/// Active refresh rate from a `refresh-rate : 120.00 Hz` line
pub fn parse_refresh_rate(content: &str) -> Option<f64> {
    content.lines().find_map(|line| {
        let (_, rest) = line.split_once("refresh-rate")?;
        let (_, value) = rest.split_once(':')?;
        let value = value.trim().strip_suffix("Hz").unwrap_or(value).trim();
        value.split_whitespace().next()?.parse::<f64>().ok()
    })
}

/// Last `SurfaceView[<package>/...](BLAST)#n` entry of a layer listing
pub fn find_target_layer(listing: &str, package: &str) -> Option<String> {
    let prefix = format!("SurfaceView[{}/", package);

    listing
        .lines()
        .filter_map(|line| {
            let start = line.find(&prefix)?;
            let candidate = &line[start..];
            let marker = candidate.find("](BLAST)#")?;
            let digits_start = marker + "](BLAST)#".len();
            let digits = candidate[digits_start..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .count();

            if digits == 0 {
                return None;
            }
            Some(candidate[..digits_start + digits].to_string())
        })
        .last()
}

/// First non-loopback local address listed in `/proc/net/fib_trie`
///
/// Local addresses appear as a `|-- <addr>` line followed by
/// `/32 host LOCAL`.
pub fn parse_fib_trie_local(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();

    lines.windows(2).find_map(|pair| {
        if !pair[1].trim().starts_with("/32 host LOCAL") {
            return None;
        }
        let address = pair[0].trim().strip_prefix("|-- ")?.trim();
        (!address.starts_with("127.")).then(|| address.to_string())
    })
}
