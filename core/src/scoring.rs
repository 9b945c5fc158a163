use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Time constant of the staleness curve, in days. At 14 days staleness is
/// about 0.5, at 90 days it is above 0.98.
pub const DEFAULT_STALENESS_TIME_CONSTANT_DAYS: f64 = 20.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Weights of the composite ranking value. They sum to 1.0 by default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub relevance: f64,
    pub staleness: f64,
    pub boost: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { relevance: 0.5, staleness: 0.35, boost: 0.15 }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 { self.relevance + self.staleness + self.boost }
}

/// Fractional days between `modified` and `now`, never negative.
pub fn days_since(modified: OffsetDateTime, now: OffsetDateTime) -> f64 {
    ((now - modified).as_seconds_f64() / SECONDS_PER_DAY).max(0.0)
}

pub fn relevance(similarity: f64) -> f64 {
    similarity.clamp(0.0, 1.0)
}

/// `1 - e^(-days / time_constant)`: 0 for a note touched just now,
/// approaching 1 as it ages.
pub fn staleness(days_since_modified: f64, time_constant_days: f64) -> f64 {
    if time_constant_days <= 0.0 {
        return 1.0;
    }
    1.0 - (-days_since_modified.max(0.0) / time_constant_days).exp()
}

/// Rewards isolation: unlinked notes get the full boost.
pub fn connectivity_boost(backlinks: usize) -> f64 {
    match backlinks {
        0 => 1.0,
        1 => 0.5,
        2 | 3 => 0.2,
        _ => 0.0,
    }
}

pub fn composite(relevance: f64, staleness: f64, boost: f64, weights: &ScoreWeights) -> f64 {
    relevance * weights.relevance + staleness * weights.staleness + boost * weights.boost
}
