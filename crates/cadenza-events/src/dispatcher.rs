use std::time::Duration;

use cadenza_chunk::{LoadEventInfo, MediaLoadData, SelectionReason};
use cadenza_policy::{FallbackType, LoadError};
use tracing::trace;

use crate::{AbrEvent, EventBus, LoadEvent, LoadTarget};

/// Publishes the events of one stream, stamped with its window index and
/// track id.
#[derive(Clone, Debug)]
pub struct MediaEventDispatcher {
    bus: EventBus,
    target: LoadTarget,
}

impl MediaEventDispatcher {
    pub fn new<S: Into<String>>(bus: EventBus, window_index: usize, track_id: S) -> Self {
        Self {
            bus,
            target: LoadTarget {
                window_index,
                track_id: track_id.into(),
            },
        }
    }

    /// Same bus and track, another window.
    #[must_use]
    pub fn with_window(&self, window_index: usize) -> Self {
        Self {
            bus: self.bus.clone(),
            target: LoadTarget {
                window_index,
                track_id: self.target.track_id.clone(),
            },
        }
    }

    pub fn target(&self) -> &LoadTarget {
        &self.target
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn load_started(&self, info: LoadEventInfo, media: MediaLoadData) {
        trace!(task = info.task_id.get(), "load started");
        self.bus.publish(LoadEvent::Started {
            target: self.target.clone(),
            info,
            media,
        });
    }

    pub fn load_completed(&self, info: LoadEventInfo, media: MediaLoadData) {
        trace!(task = info.task_id.get(), bytes = info.bytes_loaded, "load completed");
        self.bus.publish(LoadEvent::Completed {
            target: self.target.clone(),
            info,
            media,
        });
    }

    pub fn load_canceled(&self, info: LoadEventInfo, media: MediaLoadData) {
        trace!(task = info.task_id.get(), "load canceled");
        self.bus.publish(LoadEvent::Canceled {
            target: self.target.clone(),
            info,
            media,
        });
    }

    pub fn load_error(
        &self,
        info: LoadEventInfo,
        media: MediaLoadData,
        error: LoadError,
        retry_delay: Option<Duration>,
        fallback: Option<FallbackType>,
        fatal: bool,
    ) {
        trace!(task = info.task_id.get(), %error, ?retry_delay, ?fallback, fatal, "load error");
        self.bus.publish(LoadEvent::Error {
            target: self.target.clone(),
            info,
            media,
            error,
            retry_delay,
            fallback,
            fatal,
        });
    }

    pub fn upstream_discarded(&self, media: MediaLoadData) {
        self.bus.publish(LoadEvent::UpstreamDiscarded {
            target: self.target.clone(),
            media,
        });
    }

    pub fn downstream_format_changed(&self, media: MediaLoadData) {
        self.bus.publish(LoadEvent::DownstreamFormatChanged {
            target: self.target.clone(),
            media,
        });
    }

    pub fn track_selected(&self, from: Option<String>, to: String, reason: SelectionReason) {
        self.bus.publish(AbrEvent::TrackSelected {
            group_id: self.target.track_id.clone(),
            from,
            to,
            reason,
        });
    }

    pub fn track_excluded(&self, format_id: String, duration: Duration) {
        self.bus.publish(AbrEvent::TrackExcluded {
            group_id: self.target.track_id.clone(),
            format_id,
            duration,
        });
    }

    pub fn location_excluded(&self, url: String, duration: Duration) {
        self.bus.publish(AbrEvent::LocationExcluded { url, duration });
    }
}
