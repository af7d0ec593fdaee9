//! Latency units and conversions

use crate::SampleRate;
use serde::{Deserialize, Serialize};

/// Latency in samples
pub type LatencySamples = u64;

/// Convert a sample count to milliseconds at `rate`
#[inline]
pub fn samples_to_ms(samples: LatencySamples, rate: SampleRate) -> f64 {
    samples as f64 * 1000.0 / rate.as_f64()
}

/// Convert milliseconds to a sample count at `rate`, rounding to nearest
#[inline]
pub fn ms_to_samples(ms: f64, rate: SampleRate) -> LatencySamples {
    if ms <= 0.0 {
        return 0;
    }
    (ms * rate.as_f64() / 1000.0).round() as LatencySamples
}

/// Min/max latency a port sees through its connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyRange {
    pub min: LatencySamples,
    pub max: LatencySamples,
}

impl LatencyRange {
    pub const ZERO: Self = Self { min: 0, max: 0 };

    #[inline]
    pub const fn new(min: LatencySamples, max: LatencySamples) -> Self {
        Self { min, max }
    }

    /// Widen to cover `other`
    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Shift both ends by `samples`
    #[inline]
    pub fn offset(self, samples: LatencySamples) -> Self {
        Self {
            min: self.min + samples,
            max: self.max + samples,
        }
    }
}
