use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use cadenza_chunk::{ChunkIterator, Format, MediaChunk, SelectionReason, TrackGroup};

use crate::{
    base::BaseTrackSelection,
    error::AbrResult,
    selection::{SelectionInput, TrackSelection},
};

/// Selection pinned to a single track.
#[derive(Clone, Debug)]
pub struct FixedTrackSelection {
    base: BaseTrackSelection,
    reason: SelectionReason,
}

impl FixedTrackSelection {
    /// # Errors
    ///
    /// [`AbrError::TrackIndexOutOfRange`](crate::AbrError) when `track` is
    /// not in `group`.
    pub fn new(group: TrackGroup, track: usize) -> AbrResult<Self> {
        Self::with_reason(group, track, SelectionReason::Unknown)
    }

    /// # Errors
    ///
    /// See [`FixedTrackSelection::new`].
    pub fn with_reason(
        group: TrackGroup,
        track: usize,
        reason: SelectionReason,
    ) -> AbrResult<Self> {
        Ok(Self {
            base: BaseTrackSelection::new(group, &[track])?,
            reason,
        })
    }
}

impl TrackSelection for FixedTrackSelection {
    fn group(&self) -> &TrackGroup {
        self.base.group()
    }

    fn length(&self) -> usize {
        1
    }

    fn format(&self, index: usize) -> Option<&Arc<Format>> {
        self.base.format(index)
    }

    fn index_in_track_group(&self, index: usize) -> Option<usize> {
        self.base.index_in_track_group(index)
    }

    fn index_of(&self, format: &Arc<Format>) -> Option<usize> {
        self.base.index_of(format)
    }

    fn enable(&mut self) -> AbrResult<()> {
        self.base.enable()
    }

    fn disable(&mut self) -> AbrResult<()> {
        self.base.disable()
    }

    fn is_enabled(&self) -> bool {
        self.base.is_enabled()
    }

    fn selected_index(&self) -> usize {
        0
    }

    fn selected_format(&self) -> &Arc<Format> {
        &self.base.formats()[0]
    }

    fn selection_reason(&self) -> SelectionReason {
        self.reason
    }

    fn update_selected_track(
        &mut self,
        _input: &SelectionInput,
        _queue: &[MediaChunk],
        _iterators: &mut [Box<dyn ChunkIterator>],
    ) -> AbrResult<()> {
        self.base.ensure_enabled()
    }

    fn evaluate_queue_size(
        &mut self,
        _playback_position: Duration,
        queue: &[MediaChunk],
        _now: Instant,
    ) -> AbrResult<usize> {
        self.base.ensure_enabled()?;
        Ok(queue.len())
    }

    fn exclude(&mut self, index: usize, duration: Duration, now: Instant) -> AbrResult<bool> {
        self.base.exclude(index, duration, now)
    }

    fn is_excluded(&self, index: usize, now: Instant) -> bool {
        self.base.is_excluded(index, now)
    }
}
