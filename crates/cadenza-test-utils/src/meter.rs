//! Bandwidth meter with a settable estimate.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use cadenza_bandwidth::{BandwidthMeter, BandwidthSample, ListenerId};
use parking_lot::Mutex;

#[derive(Default)]
struct Shared {
    estimate: AtomicU64,
    ttfb: Mutex<Option<Duration>>,
    listeners: Mutex<Vec<(ListenerId, kanal::Sender<BandwidthSample>)>>,
    next_id: AtomicU64,
}

/// [`BandwidthMeter`] reporting whatever estimate the test sets.
///
/// Clones share state, so a test can keep one handle and hand another to the
/// code under test.
#[derive(Clone, Default)]
pub struct FixedBandwidthMeter {
    shared: Arc<Shared>,
}

impl FixedBandwidthMeter {
    #[must_use]
    pub fn new(bitrate_estimate: u64) -> Self {
        let meter = Self::default();
        meter.set_bitrate_estimate(bitrate_estimate);
        meter
    }

    pub fn set_bitrate_estimate(&self, bps: u64) {
        self.shared.estimate.store(bps, Ordering::Release);
    }

    pub fn set_time_to_first_byte(&self, ttfb: Option<Duration>) {
        *self.shared.ttfb.lock() = ttfb;
    }

    /// Push a sample to registered listeners, as a real meter would after a
    /// transfer.
    pub fn emit(&self, elapsed: Duration, bytes_transferred: u64) {
        let sample = BandwidthSample {
            elapsed,
            bytes_transferred,
            bitrate_estimate: self.bitrate_estimate(),
        };
        self.shared
            .listeners
            .lock()
            .retain(|(_, tx)| tx.try_send(sample).is_ok());
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }
}

impl BandwidthMeter for FixedBandwidthMeter {
    fn bitrate_estimate(&self) -> u64 {
        self.shared.estimate.load(Ordering::Acquire)
    }

    fn time_to_first_byte_estimate(&self) -> Option<Duration> {
        *self.shared.ttfb.lock()
    }

    fn add_event_listener(&self, listener: kanal::Sender<BandwidthSample>) -> ListenerId {
        let id = ListenerId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.lock().push((id, listener));
        id
    }

    fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}
