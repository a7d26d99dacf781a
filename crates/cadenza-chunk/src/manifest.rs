use std::{sync::Arc, time::Duration};

use cadenza_net::DataSpec;
use url::Url;

use crate::{
    error::{ChunkError, ChunkResult},
    format::Format,
    group::TrackGroup,
    timeline::{Segment, SegmentTimeline},
};

/// Alternative origin for every segment of a manifest. Lower priority
/// values are preferred.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BaseLocation {
    pub url: Url,
    pub priority: u32,
}

impl BaseLocation {
    pub fn new(url: Url, priority: u32) -> Self {
        Self { url, priority }
    }

    /// Resolve a segment against this location.
    pub fn resolve(&self, segment: &Segment) -> ChunkResult<DataSpec> {
        let url = self
            .url
            .join(&segment.uri)
            .map_err(|e| ChunkError::InvalidUrl(format!("{}: {e}", segment.uri)))?;
        let spec = DataSpec::new(url);
        Ok(match segment.range {
            Some(range) => spec.with_range(range),
            None => spec,
        })
    }
}

/// One adaptation set: a track group, a timeline per format, and the
/// locations its segments are served from.
#[derive(Clone, Debug)]
pub struct TrackManifest {
    group: TrackGroup,
    timelines: Vec<Arc<SegmentTimeline>>,
    locations: Vec<BaseLocation>,
}

impl TrackManifest {
    /// # Errors
    ///
    /// Returns [`ChunkError::TrackIndexOutOfRange`] when the timeline count
    /// does not match the group, and [`ChunkError::NoLocations`] without a
    /// base location.
    pub fn new(
        group: TrackGroup,
        timelines: Vec<SegmentTimeline>,
        mut locations: Vec<BaseLocation>,
    ) -> ChunkResult<Self> {
        if timelines.len() != group.len() {
            return Err(ChunkError::TrackIndexOutOfRange {
                index: timelines.len(),
                len: group.len(),
            });
        }
        if locations.is_empty() {
            return Err(ChunkError::NoLocations);
        }
        locations.sort_by_key(|l| l.priority);
        Ok(Self {
            group,
            timelines: timelines.into_iter().map(Arc::new).collect(),
            locations,
        })
    }

    pub fn group(&self) -> &TrackGroup {
        &self.group
    }

    pub fn format(&self, track: usize) -> ChunkResult<&Arc<Format>> {
        self.group.format(track)
    }

    pub fn timeline(&self, track: usize) -> ChunkResult<&Arc<SegmentTimeline>> {
        self.timelines
            .get(track)
            .ok_or(ChunkError::TrackIndexOutOfRange {
                index: track,
                len: self.timelines.len(),
            })
    }

    /// Locations in preference order.
    pub fn locations(&self) -> &[BaseLocation] {
        &self.locations
    }

    pub fn is_live(&self) -> bool {
        self.timelines.iter().any(|t| t.is_live())
    }

    /// Media time after `position` that can still be fetched. `None` for live
    /// content, whose availability is unbounded.
    pub fn available_duration(&self, position: Duration) -> Option<Duration> {
        if self.is_live() {
            return None;
        }
        let end = self.timelines.iter().map(|t| t.end()).min()?;
        Some(end.saturating_sub(position))
    }

    pub fn duration(&self) -> Option<Duration> {
        if self.is_live() {
            return None;
        }
        self.timelines.iter().map(|t| t.end()).min()
    }
}
