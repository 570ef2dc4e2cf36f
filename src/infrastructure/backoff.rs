use crate::types::constants::{DEFAULT_RECONNECT_FALLBACK, RECONNECT_INTERVALS};
use std::time::Duration;

/// Reconnect delay policy.
///
/// Either a fixed table of intervals (the last entry repeats once the table is
/// exhausted) or an exponential curve capped at a maximum.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Intervals(Vec<u64>),
    Exponential { min: Duration, max: Duration },
}

impl Backoff {
    pub fn new(intervals: Vec<u64>) -> Self {
        Self::Intervals(intervals)
    }

    pub fn exponential(min: Duration, max: Duration) -> Self {
        Self::Exponential { min, max }
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1);
        match self {
            Self::Intervals(intervals) => {
                let delay = intervals
                    .get(index as usize)
                    .or_else(|| intervals.last())
                    .copied()
                    .unwrap_or(DEFAULT_RECONNECT_FALLBACK);
                Duration::from_millis(delay)
            }
            Self::Exponential { min, max } => {
                let factor = 2u32.checked_pow(index.min(31)).unwrap_or(u32::MAX);
                min.checked_mul(factor).unwrap_or(*max).min(*max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(RECONNECT_INTERVALS.to_vec())
    }
}
