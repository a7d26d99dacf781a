use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use cadenza_chunk::{
    ChunkDescriptor, ChunkIterator, Format, MediaChunk, SelectionReason, TrackGroup,
};

use crate::error::{AbrError, AbrResult};

/// Playback state sampled at a buffering decision point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionInput {
    pub playback_position: Duration,
    pub buffered_duration: Duration,
    /// Media left to the end or live edge; `None` when unbounded or unknown.
    pub available_duration: Option<Duration>,
    pub now: Instant,
}

/// Selection of one or more tracks of a group, exactly one of which is
/// currently selected.
///
/// Indices are positions within the selection, ordered by decreasing
/// bitrate. A selection starts disabled; the decision operations fail with
/// [`AbrError::NotEnabled`] until [`enable`](Self::enable) is called.
pub trait TrackSelection: Send {
    fn group(&self) -> &TrackGroup;

    /// Number of tracks in the selection.
    fn length(&self) -> usize;

    fn format(&self, index: usize) -> Option<&Arc<Format>>;

    fn index_in_track_group(&self, index: usize) -> Option<usize>;

    /// Selection index of `format`, by identity.
    fn index_of(&self, format: &Arc<Format>) -> Option<usize>;

    /// # Errors
    ///
    /// [`AbrError::AlreadyEnabled`] if already enabled.
    fn enable(&mut self) -> AbrResult<()>;

    /// # Errors
    ///
    /// [`AbrError::NotEnabled`] if not enabled.
    fn disable(&mut self) -> AbrResult<()>;

    fn is_enabled(&self) -> bool;

    fn selected_index(&self) -> usize;

    fn selected_format(&self) -> &Arc<Format>;

    fn selected_index_in_track_group(&self) -> usize {
        self.index_in_track_group(self.selected_index())
            .unwrap_or_default()
    }

    fn selection_reason(&self) -> SelectionReason;

    /// Decide the track for the next chunk.
    ///
    /// `queue` is the read-only buffered queue. `iterators` hold one iterator
    /// per selection index over that track's upcoming chunks, or none at all.
    fn update_selected_track(
        &mut self,
        input: &SelectionInput,
        queue: &[MediaChunk],
        iterators: &mut [Box<dyn ChunkIterator>],
    ) -> AbrResult<()>;

    /// Number of queued chunks to keep. Only called while no chunk is loading;
    /// returning `queue.len()` keeps everything.
    fn evaluate_queue_size(
        &mut self,
        playback_position: Duration,
        queue: &[MediaChunk],
        now: Instant,
    ) -> AbrResult<usize>;

    /// Whether the chunk currently loading should be abandoned.
    fn should_cancel_chunk_load(
        &self,
        _playback_position: Duration,
        _loading: &ChunkDescriptor,
        _queue: &[MediaChunk],
    ) -> AbrResult<bool> {
        if self.is_enabled() {
            Ok(false)
        } else {
            Err(AbrError::NotEnabled)
        }
    }

    /// Exclude a track for `duration`. Returns `false`, leaving state
    /// unchanged, if every other track is already excluded.
    fn exclude(&mut self, index: usize, duration: Duration, now: Instant) -> AbrResult<bool>;

    fn is_excluded(&self, index: usize, now: Instant) -> bool;

    /// Number of tracks excluded at `now`.
    fn excluded_count(&self, now: Instant) -> usize {
        (0..self.length())
            .filter(|i| self.is_excluded(*i, now))
            .count()
    }

    fn on_playback_speed(&mut self, _speed: f32) {}

    fn on_discontinuity(&mut self) {}
}
