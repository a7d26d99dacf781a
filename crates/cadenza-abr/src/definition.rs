use std::sync::Arc;

use cadenza_bandwidth::BandwidthMeter;
use cadenza_chunk::{SelectionReason, TrackGroup};
use tracing::debug;

use crate::{
    adaptive::AdaptiveTrackSelection,
    error::{AbrError, AbrResult},
    fixed::FixedTrackSelection,
    options::AbrOptions,
    selection::TrackSelection,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionType {
    #[default]
    Adaptive,
    Fixed,
}

/// Which tracks of a group to select from, and how.
///
/// Replaced wholesale when the selection criteria change.
#[derive(Clone, Debug)]
pub struct TrackSelectionDefinition {
    pub group: TrackGroup,
    pub tracks: Vec<usize>,
    pub selection_type: SelectionType,
}

impl TrackSelectionDefinition {
    pub fn new(group: TrackGroup, tracks: Vec<usize>, selection_type: SelectionType) -> Self {
        Self {
            group,
            tracks,
            selection_type,
        }
    }

    /// Adaptive selection over every track of `group`.
    pub fn all_tracks(group: TrackGroup) -> Self {
        let tracks = (0..group.len()).collect();
        Self::new(group, tracks, SelectionType::Adaptive)
    }

    pub fn fixed(group: TrackGroup, track: usize) -> Self {
        Self::new(group, vec![track], SelectionType::Fixed)
    }
}

/// Builds a [`TrackSelection`] for a definition.
pub trait TrackSelectionFactory: Send + Sync {
    /// # Errors
    ///
    /// [`AbrError`] when the definition names no tracks or tracks outside
    /// its group.
    fn create(&self, definition: &TrackSelectionDefinition) -> AbrResult<Box<dyn TrackSelection>>;
}

fn first_track(definition: &TrackSelectionDefinition) -> AbrResult<usize> {
    definition
        .tracks
        .first()
        .copied()
        .ok_or(AbrError::EmptySelection)
}

/// Creates [`AdaptiveTrackSelection`]s sharing one bandwidth meter.
///
/// Fixed definitions and single-track definitions get a
/// [`FixedTrackSelection`].
#[derive(Clone)]
pub struct AdaptiveTrackSelectionFactory {
    meter: Arc<dyn BandwidthMeter>,
    options: AbrOptions,
}

impl AdaptiveTrackSelectionFactory {
    pub fn new(meter: Arc<dyn BandwidthMeter>, options: AbrOptions) -> Self {
        Self { meter, options }
    }
}

impl TrackSelectionFactory for AdaptiveTrackSelectionFactory {
    fn create(&self, definition: &TrackSelectionDefinition) -> AbrResult<Box<dyn TrackSelection>> {
        if definition.selection_type == SelectionType::Fixed || definition.tracks.len() == 1 {
            let reason = match definition.selection_type {
                SelectionType::Fixed => SelectionReason::Manual,
                SelectionType::Adaptive => SelectionReason::Initial,
            };
            let track = first_track(definition)?;
            return Ok(Box::new(FixedTrackSelection::with_reason(
                definition.group.clone(),
                track,
                reason,
            )?));
        }

        debug!(
            group = definition.group.id(),
            tracks = definition.tracks.len(),
            "creating adaptive track selection"
        );
        Ok(Box::new(AdaptiveTrackSelection::new(
            definition.group.clone(),
            &definition.tracks,
            Arc::clone(&self.meter),
            self.options.clone(),
        )?))
    }
}

/// Creates [`FixedTrackSelection`]s on the first track of each definition.
#[derive(Clone, Copy, Debug)]
pub struct FixedTrackSelectionFactory {
    reason: SelectionReason,
}

impl FixedTrackSelectionFactory {
    pub fn new(reason: SelectionReason) -> Self {
        Self { reason }
    }
}

impl Default for FixedTrackSelectionFactory {
    fn default() -> Self {
        Self::new(SelectionReason::Manual)
    }
}

impl TrackSelectionFactory for FixedTrackSelectionFactory {
    fn create(&self, definition: &TrackSelectionDefinition) -> AbrResult<Box<dyn TrackSelection>> {
        let track = first_track(definition)?;
        Ok(Box::new(FixedTrackSelection::with_reason(
            definition.group.clone(),
            track,
            self.reason,
        )?))
    }
}
