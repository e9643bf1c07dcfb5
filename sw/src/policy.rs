//! Bypass decision policy

use std::time::Duration;

use tracing::debug;

/// Default minimum average recovered per minute
pub const DEFAULT_MIN_AVG: f64 = 1.0;

/// Default time a unit must run before it can be judged
pub const DEFAULT_MIN_ELAPSED: Duration = Duration::from_secs(60);

/// Limits a unit of work is judged against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum acceptable average recovered per minute
    pub min_avg: f64,
    /// Units younger than this are never judged
    pub min_elapsed: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_avg: DEFAULT_MIN_AVG,
            min_elapsed: DEFAULT_MIN_ELAPSED,
        }
    }
}

/// Why the policy decided not to act
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// The unit has not been running for `min_elapsed` yet
    TooEarly,
    /// The worker expects to finish the unit within `min_elapsed`
    NearlyDone,
    /// No average could be computed for this report
    RateUnknown,
    /// The average is at or above `min_avg`
    RateOk,
}

/// Outcome of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassDecision {
    Hold(HoldReason),
    Bypass,
}

impl BypassDecision {
    pub fn is_bypass(&self) -> bool {
        matches!(self, BypassDecision::Bypass)
    }
}

/// Decides whether the current unit should be skipped
#[derive(Debug, Clone, Copy)]
pub struct BypassPolicy {
    thresholds: Thresholds,
    watch_estimated: bool,
}

impl BypassPolicy {
    /// Create a policy. `watch_estimated` enables the nearly-done escape clause.
    pub fn new(thresholds: Thresholds, watch_estimated: bool) -> Self {
        debug!(?thresholds, watch_estimated, "BypassPolicy::new: called");
        Self {
            thresholds,
            watch_estimated,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn watches_estimated(&self) -> bool {
        self.watch_estimated
    }

    /// Judge the current unit from its timers and average rate
    pub fn evaluate(&self, time_started: Duration, time_estimated: Duration, avg: Option<f64>) -> BypassDecision {
        let min_elapsed = self.thresholds.min_elapsed;
        let decision = if time_started <= min_elapsed {
            BypassDecision::Hold(HoldReason::TooEarly)
        } else if self.watch_estimated && time_estimated <= min_elapsed {
            BypassDecision::Hold(HoldReason::NearlyDone)
        } else {
            match avg {
                None => BypassDecision::Hold(HoldReason::RateUnknown),
                Some(avg) if avg < self.thresholds.min_avg => BypassDecision::Bypass,
                Some(_) => BypassDecision::Hold(HoldReason::RateOk),
            }
        };
        debug!(?time_started, ?time_estimated, ?avg, ?decision, "BypassPolicy::evaluate: decided");
        decision
    }
}
