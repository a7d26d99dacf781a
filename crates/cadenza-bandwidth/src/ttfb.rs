use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use cadenza_net::DataSpec;

/// Exponentially weighted average of the delay between opening a transfer
/// and its first byte.
#[derive(Debug)]
pub struct TimeToFirstByteEstimator {
    smoothing: f64,
    estimate: Option<Duration>,
    pending: HashMap<DataSpec, Instant>,
}

impl TimeToFirstByteEstimator {
    /// Open transfers tracked at most; older entries are dropped past this.
    const MAX_PENDING: usize = 64;

    pub fn new(smoothing: f64) -> Self {
        Self {
            smoothing: smoothing.clamp(0.0, 0.999),
            estimate: None,
            pending: HashMap::new(),
        }
    }

    pub fn estimate(&self) -> Option<Duration> {
        self.estimate
    }

    pub fn on_transfer_initializing(&mut self, spec: &DataSpec, now: Instant) {
        if self.pending.len() >= Self::MAX_PENDING {
            self.pending.clear();
        }
        self.pending.insert(spec.clone(), now);
    }

    pub fn on_transfer_start(&mut self, spec: &DataSpec, now: Instant) {
        let Some(opened) = self.pending.remove(spec) else {
            return;
        };
        let sample = now.saturating_duration_since(opened);
        self.estimate = Some(match self.estimate {
            None => sample,
            Some(prev) => prev.mul_f64(self.smoothing) + sample.mul_f64(1.0 - self.smoothing),
        });
    }

    pub fn reset(&mut self) {
        self.estimate = None;
        self.pending.clear();
    }
}
