//! Running latency statistics.

use serde::{Deserialize, Serialize};

/// Samples at or above this are subscribe round trips that effectively timed
/// out.
pub const PING_BOUND_MS: f64 = 9999.0;

/// Samples at or above this are job waits that hit the wait ceiling.
pub const JOB_WAIT_BOUND_MS: f64 = 30000.0;

/// Count, min, max and sum of the samples that carried a signal.
///
/// A sample is kept only when `0 < sample < bound`. Anything else means "not
/// measured" and leaves the statistics untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PingStats {
    pub count: u32,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl PingStats {
    /// Add a sample if it lies strictly inside `(0, bound)`.
    ///
    /// Returns whether the sample was kept.
    pub fn add_bounded(&mut self, sample_ms: f64, bound_ms: f64) -> bool {
        if !(sample_ms > 0.0 && sample_ms < bound_ms) {
            return false;
        }

        if self.count == 0 {
            self.min = sample_ms;
            self.max = sample_ms;
        } else {
            self.min = self.min.min(sample_ms);
            self.max = self.max.max(sample_ms);
        }
        self.sum += sample_ms;
        self.count += 1;
        true
    }

    /// Mean of the kept samples, 0 when there are none.
    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / f64::from(self.count)
    }

    /// Spread between the slowest and fastest kept sample.
    pub fn jitter(&self) -> f64 {
        (self.max - self.min).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
