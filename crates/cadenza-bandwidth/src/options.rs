use std::time::Duration;

/// Which estimator a [`DefaultBandwidthMeter`](crate::DefaultBandwidthMeter)
/// builds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EstimatorKind {
    /// Minimum of a fast and a slow exponentially weighted average.
    Ewma {
        fast_half_life: Duration,
        slow_half_life: Duration,
    },
    /// Weighted percentile over a sliding window of samples.
    SlidingPercentile { max_weight: f64, percentile: f64 },
}

impl Default for EstimatorKind {
    fn default() -> Self {
        Self::Ewma {
            fast_half_life: Duration::from_secs(2),
            slow_half_life: Duration::from_secs(10),
        }
    }
}

/// Bandwidth meter configuration.
#[derive(Clone, Debug)]
pub struct BandwidthOptions {
    /// Reported until enough data has been sampled, in bits per second.
    pub initial_bitrate_estimate: u64,
    /// Transfers smaller than this carry too much fixed latency to sample.
    pub min_sample_bytes: u64,
    /// Sampled time after which the estimator output replaces the initial
    /// estimate.
    pub min_elapsed_for_estimate: Duration,
    /// Sampled bytes after which the estimator output replaces the initial
    /// estimate.
    pub min_bytes_for_estimate: u64,
    pub estimator: EstimatorKind,
    /// Smoothing factor of the time-to-first-byte average, in `[0, 1)`.
    pub ttfb_smoothing: f64,
}

impl Default for BandwidthOptions {
    fn default() -> Self {
        Self {
            initial_bitrate_estimate: 1_000_000,
            min_sample_bytes: 16_000,
            min_elapsed_for_estimate: Duration::from_secs(2),
            min_bytes_for_estimate: 512 * 1024,
            estimator: EstimatorKind::default(),
            ttfb_smoothing: 0.85,
        }
    }
}

impl BandwidthOptions {
    pub fn with_initial_bitrate_estimate(mut self, bps: u64) -> Self {
        self.initial_bitrate_estimate = bps;
        self
    }

    pub fn with_min_sample_bytes(mut self, bytes: u64) -> Self {
        self.min_sample_bytes = bytes;
        self
    }

    pub fn with_min_elapsed_for_estimate(mut self, elapsed: Duration) -> Self {
        self.min_elapsed_for_estimate = elapsed;
        self
    }

    pub fn with_min_bytes_for_estimate(mut self, bytes: u64) -> Self {
        self.min_bytes_for_estimate = bytes;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorKind) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_ttfb_smoothing(mut self, factor: f64) -> Self {
        self.ttfb_smoothing = factor;
        self
    }
}
