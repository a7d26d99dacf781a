use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use cadenza_net::{DataSpec, TransferListener};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    estimator::{BandwidthEstimator, EwmaEstimator, SlidingPercentileEstimator},
    options::{BandwidthOptions, EstimatorKind},
    sample::{BandwidthSample, ListenerId},
    ttfb::TimeToFirstByteEstimator,
};

/// Read side of bandwidth estimation, shared with track selection.
#[cfg_attr(
    any(test, feature = "test-utils"),
    unimock::unimock(api = BandwidthMeterMock)
)]
pub trait BandwidthMeter: Send + Sync {
    /// Current estimate in bits per second.
    fn bitrate_estimate(&self) -> u64;

    /// `None` until at least one network transfer delivered its first byte.
    fn time_to_first_byte_estimate(&self) -> Option<Duration>;

    /// Register a listener receiving a [`BandwidthSample`] per measurement.
    fn add_event_listener(&self, listener: kanal::Sender<BandwidthSample>) -> ListenerId;

    /// Returns `false` if the listener was not registered.
    fn remove_event_listener(&self, id: ListenerId) -> bool;
}

struct MeterState {
    estimator: Box<dyn BandwidthEstimator>,
    ttfb: TimeToFirstByteEstimator,
    active_transfers: usize,
    sample_start: Option<Instant>,
    sample_bytes: u64,
    total_elapsed: Duration,
    total_bytes: u64,
}

struct MeterInner {
    options: BandwidthOptions,
    state: Mutex<MeterState>,
    estimate_bps: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, kanal::Sender<BandwidthSample>)>>,
    next_listener_id: AtomicU64,
}

/// Default [`BandwidthMeter`], fed by transfer callbacks.
///
/// Overlapping transfers are measured as one stream: a sample spans from the
/// first transfer start to the next transfer end. Cloning yields a handle to
/// the same meter.
#[derive(Clone)]
pub struct DefaultBandwidthMeter {
    inner: Arc<MeterInner>,
}

impl DefaultBandwidthMeter {
    pub fn new(options: BandwidthOptions) -> Self {
        let estimator: Box<dyn BandwidthEstimator> = match options.estimator {
            EstimatorKind::Ewma {
                fast_half_life,
                slow_half_life,
            } => Box::new(EwmaEstimator::new(fast_half_life, slow_half_life)),
            EstimatorKind::SlidingPercentile {
                max_weight,
                percentile,
            } => Box::new(SlidingPercentileEstimator::new(max_weight, percentile)),
        };
        Self::with_estimator(options, estimator)
    }

    pub fn with_estimator(
        options: BandwidthOptions,
        estimator: Box<dyn BandwidthEstimator>,
    ) -> Self {
        let ttfb = TimeToFirstByteEstimator::new(options.ttfb_smoothing);
        let initial = options.initial_bitrate_estimate;
        Self {
            inner: Arc::new(MeterInner {
                options,
                state: Mutex::new(MeterState {
                    estimator,
                    ttfb,
                    active_transfers: 0,
                    sample_start: None,
                    sample_bytes: 0,
                    total_elapsed: Duration::ZERO,
                    total_bytes: 0,
                }),
                estimate_bps: AtomicU64::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// Feed a measurement directly, bypassing transfer tracking.
    pub fn add_sample(&self, bytes: u64, elapsed: Duration) {
        let sample = {
            let mut state = self.inner.state.lock();
            self.record(&mut state, bytes, elapsed)
        };
        if let Some(sample) = sample {
            self.notify(sample);
        }
    }

    /// Forget all samples and fall back to the initial estimate.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.estimator.reset();
        state.ttfb.reset();
        state.sample_bytes = 0;
        state.sample_start = (state.active_transfers > 0).then(Instant::now);
        state.total_elapsed = Duration::ZERO;
        state.total_bytes = 0;
        self.inner
            .estimate_bps
            .store(self.inner.options.initial_bitrate_estimate, Ordering::Release);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn record(
        &self,
        state: &mut MeterState,
        bytes: u64,
        elapsed: Duration,
    ) -> Option<BandwidthSample> {
        let options = &self.inner.options;
        if bytes < options.min_sample_bytes || elapsed.is_zero() {
            trace!(bytes, ?elapsed, "bandwidth sample too small, ignored");
            return None;
        }

        state.estimator.add_sample(bytes, elapsed);
        state.total_elapsed += elapsed;
        state.total_bytes = state.total_bytes.saturating_add(bytes);

        let warmed_up = state.total_elapsed >= options.min_elapsed_for_estimate
            || state.total_bytes >= options.min_bytes_for_estimate;
        let estimate = if warmed_up {
            state
                .estimator
                .estimate_bps()
                .unwrap_or(options.initial_bitrate_estimate)
        } else {
            options.initial_bitrate_estimate
        };
        self.inner.estimate_bps.store(estimate, Ordering::Release);

        debug!(bytes, ?elapsed, estimate, warmed_up, "bandwidth sample");
        Some(BandwidthSample {
            elapsed,
            bytes_transferred: bytes,
            bitrate_estimate: estimate,
        })
    }

    fn notify(&self, sample: BandwidthSample) {
        self.inner.listeners.lock().retain(|(id, tx)| match tx.try_send(sample) {
            Ok(_) => true,
            Err(_) => {
                debug!(listener = id.0, "bandwidth listener disconnected, pruned");
                false
            }
        });
    }
}

impl Default for DefaultBandwidthMeter {
    fn default() -> Self {
        Self::new(BandwidthOptions::default())
    }
}

impl BandwidthMeter for DefaultBandwidthMeter {
    fn bitrate_estimate(&self) -> u64 {
        self.inner.estimate_bps.load(Ordering::Acquire)
    }

    fn time_to_first_byte_estimate(&self) -> Option<Duration> {
        self.inner.state.lock().ttfb.estimate()
    }

    fn add_event_listener(&self, listener: kanal::Sender<BandwidthSample>) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, listener));
        id
    }

    fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }
}

impl TransferListener for DefaultBandwidthMeter {
    fn on_transfer_initializing(&self, spec: &DataSpec, is_network: bool) {
        if is_network {
            self.inner
                .state
                .lock()
                .ttfb
                .on_transfer_initializing(spec, Instant::now());
        }
    }

    fn on_transfer_start(&self, spec: &DataSpec, is_network: bool) {
        if !is_network {
            return;
        }
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        state.ttfb.on_transfer_start(spec, now);
        if state.active_transfers == 0 {
            state.sample_start = Some(now);
        }
        state.active_transfers += 1;
    }

    fn on_bytes_transferred(&self, _spec: &DataSpec, is_network: bool, bytes: usize) {
        if is_network {
            let mut state = self.inner.state.lock();
            state.sample_bytes = state.sample_bytes.saturating_add(bytes as u64);
        }
    }

    fn on_transfer_end(&self, _spec: &DataSpec, is_network: bool) {
        if !is_network {
            return;
        }
        let now = Instant::now();
        let sample = {
            let mut state = self.inner.state.lock();
            if state.active_transfers == 0 {
                debug!("transfer end without matching start");
                return;
            }
            state.active_transfers -= 1;
            let elapsed = state
                .sample_start
                .map_or(Duration::ZERO, |start| now.saturating_duration_since(start));
            let bytes = std::mem::take(&mut state.sample_bytes);
            state.sample_start = (state.active_transfers > 0).then_some(now);
            self.record(&mut state, bytes, elapsed)
        };
        if let Some(sample) = sample {
            self.notify(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use mockall::predicate::eq;
    use rstest::rstest;
    use url::Url;

    use super::*;
    use crate::estimator::MockBandwidthEstimator;

    fn spec() -> DataSpec {
        DataSpec::new(Url::parse("http://cdn.test/seg-1.m4s").unwrap())
    }

    fn eager() -> BandwidthOptions {
        BandwidthOptions::default()
            .with_min_elapsed_for_estimate(Duration::ZERO)
            .with_min_sample_bytes(1_000)
    }

    #[test]
    fn initial_estimate_before_samples() {
        let meter = DefaultBandwidthMeter::new(
            BandwidthOptions::default().with_initial_bitrate_estimate(750_000),
        );
        assert_eq!(meter.bitrate_estimate(), 750_000);
        assert_eq!(meter.time_to_first_byte_estimate(), None);
    }

    #[test]
    fn estimate_waits_for_warm_up() {
        let meter = DefaultBandwidthMeter::new(
            BandwidthOptions::default()
                .with_initial_bitrate_estimate(1_000)
                .with_min_bytes_for_estimate(1_000_000),
        );
        meter.add_sample(100_000, Duration::from_millis(100));
        assert_eq!(meter.bitrate_estimate(), 1_000);

        meter.add_sample(900_000, Duration::from_millis(900));
        assert_eq!(meter.bitrate_estimate(), 8_000_000);
    }

    #[rstest]
    #[case::too_small(999, Duration::from_secs(1))]
    #[case::zero_elapsed(50_000, Duration::ZERO)]
    fn rejected_samples_leave_estimate(#[case] bytes: u64, #[case] elapsed: Duration) {
        let meter = DefaultBandwidthMeter::new(eager());
        meter.add_sample(bytes, elapsed);
        assert_eq!(meter.bitrate_estimate(), 1_000_000);
    }

    #[test]
    fn estimator_is_pluggable() {
        let mut estimator = MockBandwidthEstimator::new();
        estimator
            .expect_add_sample()
            .with(eq(64_000_u64), eq(Duration::from_millis(250)))
            .times(1)
            .return_const(());
        estimator.expect_estimate_bps().return_const(Some(2_048_000_u64));

        let meter = DefaultBandwidthMeter::with_estimator(eager(), Box::new(estimator));
        meter.add_sample(64_000, Duration::from_millis(250));
        assert_eq!(meter.bitrate_estimate(), 2_048_000);
    }

    #[test]
    fn listeners_receive_samples_until_removed() {
        let meter = DefaultBandwidthMeter::new(eager());
        let (tx, rx) = kanal::unbounded();
        let id = meter.add_event_listener(tx);

        meter.add_sample(125_000, Duration::from_secs(1));
        let sample = rx.try_recv().unwrap().unwrap();
        assert_eq!(sample.bytes_transferred, 125_000);
        assert_eq!(sample.elapsed, Duration::from_secs(1));
        assert_eq!(sample.bitrate_estimate, 1_000_000);

        assert!(meter.remove_event_listener(id));
        assert!(!meter.remove_event_listener(id));
        meter.add_sample(125_000, Duration::from_secs(1));
        assert!(!matches!(rx.try_recv(), Ok(Some(_))));
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let meter = DefaultBandwidthMeter::new(eager());
        let (tx, rx) = kanal::unbounded();
        meter.add_event_listener(tx);
        drop(rx);
        meter.add_sample(125_000, Duration::from_secs(1));
        assert_eq!(meter.listener_count(), 0);
    }

    #[test]
    fn network_transfer_produces_sample() {
        let meter = DefaultBandwidthMeter::new(eager());
        let (tx, rx) = kanal::unbounded();
        meter.add_event_listener(tx);
        let spec = spec();

        meter.on_transfer_initializing(&spec, true);
        meter.on_transfer_start(&spec, true);
        meter.on_bytes_transferred(&spec, true, 40_000);
        thread::sleep(Duration::from_millis(20));
        meter.on_bytes_transferred(&spec, true, 40_000);
        meter.on_transfer_end(&spec, true);

        let sample = rx.try_recv().unwrap().unwrap();
        assert_eq!(sample.bytes_transferred, 80_000);
        assert!(sample.elapsed >= Duration::from_millis(20));
        assert!(meter.time_to_first_byte_estimate().is_some());
    }

    #[test]
    fn local_transfers_are_ignored() {
        let meter = DefaultBandwidthMeter::new(eager());
        let (tx, rx) = kanal::unbounded();
        meter.add_event_listener(tx);
        let spec = spec();

        meter.on_transfer_initializing(&spec, false);
        meter.on_transfer_start(&spec, false);
        meter.on_bytes_transferred(&spec, false, 1_000_000);
        meter.on_transfer_end(&spec, false);

        assert!(rx.try_recv().unwrap().is_none());
        assert_eq!(meter.bitrate_estimate(), 1_000_000);
        assert_eq!(meter.time_to_first_byte_estimate(), None);
    }

    #[test]
    fn unbalanced_end_is_ignored() {
        let meter = DefaultBandwidthMeter::new(eager());
        meter.on_transfer_end(&spec(), true);
        assert_eq!(meter.bitrate_estimate(), 1_000_000);
    }

    #[test]
    fn reset_restores_initial_estimate() {
        let meter = DefaultBandwidthMeter::new(eager());
        meter.add_sample(1_000_000, Duration::from_secs(1));
        assert_eq!(meter.bitrate_estimate(), 8_000_000);
        meter.reset();
        assert_eq!(meter.bitrate_estimate(), 1_000_000);
    }

    #[test]
    fn concurrent_samples_keep_snapshot_consistent() {
        let meter = DefaultBandwidthMeter::new(eager());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let meter = meter.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        meter.add_sample(250_000, Duration::from_secs(1));
                    }
                })
            })
            .collect();
        for _ in 0..100 {
            let bps = meter.bitrate_estimate();
            assert!(bps == 1_000_000 || bps == 2_000_000, "torn estimate {bps}");
        }
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(meter.bitrate_estimate(), 2_000_000);
    }
}
