//! Delta-based CPU utilization

use crate::models::CoreCounters;

/// Result of feeding one counter vector into the baseline
#[derive(Debug, Clone, PartialEq)]
pub enum CpuObservation {
    /// No previous counters existed; the vector was stored as the baseline
    Baseline { cores: usize },
    /// Per-core utilization in percent since the previous observation
    Usage(Vec<f64>),
}

impl CpuObservation {
    /// Per-core utilization, all zeros for a baseline observation
    pub fn usages(&self) -> Vec<f64> {
        match self {
            CpuObservation::Baseline { cores } => vec![0.0; *cores],
            CpuObservation::Usage(usages) => usages.clone(),
        }
    }

    pub fn is_baseline(&self) -> bool {
        matches!(self, CpuObservation::Baseline { .. })
    }
}

/// Previous cumulative counters, owned by the sampler
#[derive(Debug, Clone, Default)]
pub struct CpuBaseline {
    previous: Option<Vec<CoreCounters>>,
}

impl CpuBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Compare `current` against the stored counters and replace them
    ///
    /// Index 0 is the aggregate line and is left out of the result. Only the
    /// prefix both vectors share is compared, so a core going offline between
    /// two reads shortens the output instead of failing.
    pub fn observe(&mut self, current: Vec<CoreCounters>) -> CpuObservation {
        let observation = match &self.previous {
            None => CpuObservation::Baseline {
                cores: current.len().saturating_sub(1),
            },
            Some(previous) => {
                let shared = current.len().min(previous.len());
                let usages = (1..shared)
                    .map(|i| core_usage(previous[i], current[i]))
                    .collect();
                CpuObservation::Usage(usages)
            }
        };

        self.previous = Some(current);
        observation
    }
}

/// Utilization of one core between two counter reads, in percent
///
/// A zero total delta yields 0. Counters that went backwards (hotplug or
/// reset) are treated as zero deltas.
pub fn core_usage(previous: CoreCounters, current: CoreCounters) -> f64 {
    let total_diff = current.total.saturating_sub(previous.total);
    if total_diff == 0 {
        return 0.0;
    }

    let idle_diff = current.idle.saturating_sub(previous.idle).min(total_diff);
    let busy = (total_diff - idle_diff) as f64;

    (busy / total_diff as f64 * 100.0).clamp(0.0, 100.0)
}
