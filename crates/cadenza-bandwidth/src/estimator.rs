use std::{collections::VecDeque, time::Duration};

#[cfg(test)]
use mockall::automock;

/// Pluggable bandwidth estimation strategy.
///
/// Implementations see only accepted network samples; filtering happens in
/// the meter.
#[cfg_attr(test, automock)]
pub trait BandwidthEstimator: Send {
    /// Record `bytes` transferred over `elapsed`.
    fn add_sample(&mut self, bytes: u64, elapsed: Duration);

    /// Current estimate in bits per second, if any sample was accepted.
    fn estimate_bps(&self) -> Option<u64>;

    fn reset(&mut self);
}

const MIN_DURATION_MS: f64 = 0.5;

fn bitrate(bytes: u64, elapsed: Duration) -> f64 {
    let ms = (elapsed.as_secs_f64() * 1000.0).max(MIN_DURATION_MS);
    (bytes as f64) * 8000.0 / ms
}

/// Minimum of a fast and a slow exponentially weighted moving average.
///
/// The fast average reacts to drops within a couple of seconds; the slow one
/// keeps short bursts from inflating the estimate.
#[derive(Clone, Debug)]
pub struct EwmaEstimator {
    fast: Ewma,
    slow: Ewma,
}

impl EwmaEstimator {
    pub fn new(fast_half_life: Duration, slow_half_life: Duration) -> Self {
        Self {
            fast: Ewma::new(fast_half_life.as_secs_f64()),
            slow: Ewma::new(slow_half_life.as_secs_f64()),
        }
    }
}

impl Default for EwmaEstimator {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(10))
    }
}

impl BandwidthEstimator for EwmaEstimator {
    fn add_sample(&mut self, bytes: u64, elapsed: Duration) {
        let bps = bitrate(bytes, elapsed);
        let weight_secs = elapsed.as_secs_f64().max(MIN_DURATION_MS / 1000.0);
        self.fast.add_sample(weight_secs, bps);
        self.slow.add_sample(weight_secs, bps);
    }

    fn estimate_bps(&self) -> Option<u64> {
        let est = self.fast.estimate().min(self.slow.estimate());
        (est > 0.0).then(|| est.round() as u64)
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
    }
}

#[derive(Clone, Debug)]
struct Ewma {
    alpha: f64,
    last_estimate: f64,
    total_weight: f64,
}

impl Ewma {
    fn new(half_life_secs: f64) -> Self {
        Self {
            alpha: f64::exp(0.5_f64.ln() / half_life_secs.max(0.001)),
            last_estimate: 0.0,
            total_weight: 0.0,
        }
    }

    fn add_sample(&mut self, weight: f64, val: f64) {
        let adj_alpha = self.alpha.powf(weight.max(0.0));
        self.last_estimate = val * (1.0 - adj_alpha) + adj_alpha * self.last_estimate;
        self.total_weight += weight.max(0.0);
    }

    fn estimate(&self) -> f64 {
        if self.total_weight <= 0.0 {
            return 0.0;
        }
        // Undo the bias towards the zero starting value.
        let zero_factor = 1.0 - self.alpha.powf(self.total_weight);
        self.last_estimate / zero_factor.max(1e-6)
    }

    fn reset(&mut self) {
        self.last_estimate = 0.0;
        self.total_weight = 0.0;
    }
}

#[derive(Clone, Copy, Debug)]
struct WeightedSample {
    weight: f64,
    value: f64,
}

/// Weighted percentile over the most recent samples.
///
/// Each sample weighs `sqrt(bytes)`; the oldest samples are dropped while the
/// total weight exceeds `max_weight`, always keeping the newest one.
#[derive(Clone, Debug)]
pub struct SlidingPercentileEstimator {
    max_weight: f64,
    percentile: f64,
    samples: VecDeque<WeightedSample>,
    total_weight: f64,
}

impl SlidingPercentileEstimator {
    pub fn new(max_weight: f64, percentile: f64) -> Self {
        Self {
            max_weight: max_weight.max(1.0),
            percentile: percentile.clamp(0.0, 1.0),
            samples: VecDeque::new(),
            total_weight: 0.0,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Default for SlidingPercentileEstimator {
    fn default() -> Self {
        Self::new(2000.0, 0.5)
    }
}

impl BandwidthEstimator for SlidingPercentileEstimator {
    fn add_sample(&mut self, bytes: u64, elapsed: Duration) {
        let sample = WeightedSample {
            weight: (bytes as f64).sqrt(),
            value: bitrate(bytes, elapsed),
        };
        self.samples.push_back(sample);
        self.total_weight += sample.weight;

        while self.total_weight > self.max_weight && self.samples.len() > 1 {
            if let Some(old) = self.samples.pop_front() {
                self.total_weight -= old.weight;
            }
        }
    }

    fn estimate_bps(&self) -> Option<u64> {
        let mut sorted: Vec<_> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.value.total_cmp(&b.value));

        let desired = self.percentile * self.total_weight;
        let mut accumulated = 0.0;
        for s in &sorted {
            accumulated += s.weight;
            if accumulated >= desired {
                return Some(s.value.round() as u64);
            }
        }
        sorted.last().map(|s| s.value.round() as u64)
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.total_weight = 0.0;
    }
}
