use std::time::Duration;

/// Adaptive selection configuration.
#[derive(Clone, Debug)]
pub struct AbrOptions {
    /// Divides the bandwidth estimate (1.5 means use 66% of it).
    pub throughput_safety_factor: f64,
    /// A higher-quality track is chosen only if the effective bandwidth
    /// exceeds its bitrate by this factor.
    pub up_hysteresis_ratio: f64,
    /// Buffer needed before switching to a higher quality.
    pub min_duration_for_quality_increase: Duration,
    /// Above this buffer level a lower quality is not taken.
    pub max_duration_for_quality_decrease: Duration,
    /// Buffer kept when discarding chunks for re-fetch.
    pub min_duration_to_retain_after_discard: Duration,
    /// Share of the remaining duration that must be buffered before a quality
    /// increase, when little remains to the end or live edge.
    pub buffered_fraction_to_live_edge: f64,
    pub min_time_between_buffer_reevaluation: Duration,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            throughput_safety_factor: 1.5,
            up_hysteresis_ratio: 1.3,
            min_duration_for_quality_increase: Duration::from_secs(10),
            max_duration_for_quality_decrease: Duration::from_secs(25),
            min_duration_to_retain_after_discard: Duration::from_secs(25),
            buffered_fraction_to_live_edge: 0.75,
            min_time_between_buffer_reevaluation: Duration::from_secs(2),
        }
    }
}

impl AbrOptions {
    pub fn with_throughput_safety_factor(mut self, factor: f64) -> Self {
        self.throughput_safety_factor = factor;
        self
    }

    pub fn with_up_hysteresis_ratio(mut self, ratio: f64) -> Self {
        self.up_hysteresis_ratio = ratio;
        self
    }

    pub fn with_min_duration_for_quality_increase(mut self, duration: Duration) -> Self {
        self.min_duration_for_quality_increase = duration;
        self
    }

    pub fn with_max_duration_for_quality_decrease(mut self, duration: Duration) -> Self {
        self.max_duration_for_quality_decrease = duration;
        self
    }

    pub fn with_min_duration_to_retain_after_discard(mut self, duration: Duration) -> Self {
        self.min_duration_to_retain_after_discard = duration;
        self
    }

    pub fn with_buffered_fraction_to_live_edge(mut self, fraction: f64) -> Self {
        self.buffered_fraction_to_live_edge = fraction;
        self
    }

    pub fn with_min_time_between_buffer_reevaluation(mut self, interval: Duration) -> Self {
        self.min_time_between_buffer_reevaluation = interval;
        self
    }

    /// Buffer required for a quality increase given what remains available.
    pub fn quality_increase_threshold(&self, available: Option<Duration>) -> Duration {
        match available {
            Some(available) if available <= self.min_duration_for_quality_increase => {
                available.mul_f64(self.buffered_fraction_to_live_edge)
            }
            _ => self.min_duration_for_quality_increase,
        }
    }
}
