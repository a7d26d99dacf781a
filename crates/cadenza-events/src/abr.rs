use std::time::Duration;

use cadenza_chunk::SelectionReason;

/// Track selection decisions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbrEvent {
    /// The track for upcoming chunks changed.
    TrackSelected {
        group_id: String,
        from: Option<String>,
        to: String,
        reason: SelectionReason,
    },
    /// A track was excluded after a load error.
    TrackExcluded {
        group_id: String,
        format_id: String,
        duration: Duration,
    },
    /// A base location was excluded after a load error.
    LocationExcluded { url: String, duration: Duration },
}
