use cadenza_bandwidth::BandwidthSample;

use crate::{AbrEvent, LoadEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BandwidthEvent {
    Sample(BandwidthSample),
}

/// Every event of a playback session, one variant per subsystem.
#[derive(Clone, Debug)]
pub enum Event {
    Load(LoadEvent),
    Abr(AbrEvent),
    Bandwidth(BandwidthEvent),
}

impl From<LoadEvent> for Event {
    fn from(e: LoadEvent) -> Self {
        Self::Load(e)
    }
}

impl From<AbrEvent> for Event {
    fn from(e: AbrEvent) -> Self {
        Self::Abr(e)
    }
}

impl From<BandwidthEvent> for Event {
    fn from(e: BandwidthEvent) -> Self {
        Self::Bandwidth(e)
    }
}
