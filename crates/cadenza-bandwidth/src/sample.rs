use std::time::Duration;

/// One measurement tick pushed to bandwidth listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandwidthSample {
    /// Wall time covered by the sample.
    pub elapsed: Duration,
    pub bytes_transferred: u64,
    /// Estimate after the sample was applied, in bits per second.
    pub bitrate_estimate: u64,
}

/// Handle returned by `add_event_listener`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl ListenerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}
