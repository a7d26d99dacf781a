use std::time::Duration;

use cadenza_chunk::{LoadEventInfo, MediaLoadData};
use cadenza_policy::{FallbackType, LoadError};

/// Which stream of which window an event belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoadTarget {
    pub window_index: usize,
    pub track_id: String,
}

/// Load lifecycle events.
///
/// Every load attempt produces `Started` followed by exactly one of
/// `Completed`, `Canceled` or `Error`.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadEvent {
    Started {
        target: LoadTarget,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
    Completed {
        target: LoadTarget,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
    Canceled {
        target: LoadTarget,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
    Error {
        target: LoadTarget,
        info: LoadEventInfo,
        media: MediaLoadData,
        error: LoadError,
        /// Delay before the same chunk is retried, if it will be.
        retry_delay: Option<Duration>,
        fallback: Option<FallbackType>,
        fatal: bool,
    },
    /// Buffered chunks were dropped for re-fetch.
    UpstreamDiscarded {
        target: LoadTarget,
        media: MediaLoadData,
    },
    /// The format of chunks handed downstream changed.
    DownstreamFormatChanged {
        target: LoadTarget,
        media: MediaLoadData,
    },
}

impl LoadEvent {
    pub fn target(&self) -> &LoadTarget {
        match self {
            LoadEvent::Started { target, .. }
            | LoadEvent::Completed { target, .. }
            | LoadEvent::Canceled { target, .. }
            | LoadEvent::Error { target, .. }
            | LoadEvent::UpstreamDiscarded { target, .. }
            | LoadEvent::DownstreamFormatChanged { target, .. } => target,
        }
    }

    /// Whether this event ends a load attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoadEvent::Completed { .. } | LoadEvent::Canceled { .. } | LoadEvent::Error { .. }
        )
    }
}
