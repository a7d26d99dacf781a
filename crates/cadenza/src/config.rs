//! Configuration for [`PlaybackSession`](crate::PlaybackSession).

use cadenza_abr::AbrOptions;
use cadenza_alloc::AllocatorOptions;
use cadenza_bandwidth::BandwidthOptions;
use cadenza_loader::LoadControlOptions;
use cadenza_net::NetOptions;
use cadenza_policy::LoadErrorOptions;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Every knob of a session, one options struct per subsystem.
///
/// ```ignore
/// let config = SessionConfig::default()
///     .with_abr(AbrOptions::default().with_throughput_safety_factor(1.2))
///     .with_event_capacity(1024);
/// ```
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Pool every chunk's memory comes from.
    pub allocator: AllocatorOptions,
    /// HTTP client settings. `request_timeout` also bounds each open.
    pub net: NetOptions,
    pub bandwidth: BandwidthOptions,
    pub abr: AbrOptions,
    pub load_error: LoadErrorOptions,
    pub load_control: LoadControlOptions,
    /// Events buffered per subscriber before slow ones start lagging.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allocator: AllocatorOptions::default(),
            net: NetOptions::default(),
            bandwidth: BandwidthOptions::default(),
            abr: AbrOptions::default(),
            load_error: LoadErrorOptions::default(),
            load_control: LoadControlOptions::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn with_allocator(mut self, options: AllocatorOptions) -> Self {
        self.allocator = options;
        self
    }

    pub fn with_net(mut self, options: NetOptions) -> Self {
        self.net = options;
        self
    }

    pub fn with_bandwidth(mut self, options: BandwidthOptions) -> Self {
        self.bandwidth = options;
        self
    }

    pub fn with_abr(mut self, options: AbrOptions) -> Self {
        self.abr = options;
        self
    }

    pub fn with_load_error(mut self, options: LoadErrorOptions) -> Self {
        self.load_error = options;
        self
    }

    pub fn with_load_control(mut self, options: LoadControlOptions) -> Self {
        self.load_control = options;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
