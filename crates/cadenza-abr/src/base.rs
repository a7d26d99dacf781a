use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use cadenza_chunk::{Format, TrackGroup};
use tracing::debug;

use crate::error::{AbrError, AbrResult};

/// Shared bookkeeping of a selection: track order, exclusion deadlines and
/// the enabled flag.
#[derive(Clone, Debug)]
pub struct BaseTrackSelection {
    group: TrackGroup,
    /// Group indices, by decreasing bitrate.
    tracks: Vec<usize>,
    formats: Vec<Arc<Format>>,
    excluded_until: Vec<Option<Instant>>,
    enabled: bool,
}

impl BaseTrackSelection {
    /// # Errors
    ///
    /// [`AbrError::EmptySelection`] for no tracks and
    /// [`AbrError::TrackIndexOutOfRange`] for an index outside the group.
    pub fn new(group: TrackGroup, tracks: &[usize]) -> AbrResult<Self> {
        if tracks.is_empty() {
            return Err(AbrError::EmptySelection);
        }
        let mut entries = tracks
            .iter()
            .map(|&index| {
                group
                    .format(index)
                    .map(|f| (index, Arc::clone(f)))
                    .map_err(|_| AbrError::TrackIndexOutOfRange {
                        index,
                        len: group.len(),
                    })
            })
            .collect::<AbrResult<Vec<_>>>()?;
        entries.sort_by(|a, b| b.1.bitrate.cmp(&a.1.bitrate));
        let (tracks, formats): (Vec<_>, Vec<_>) = entries.into_iter().unzip();

        Ok(Self {
            excluded_until: vec![None; tracks.len()],
            group,
            tracks,
            formats,
            enabled: false,
        })
    }

    pub fn group(&self) -> &TrackGroup {
        &self.group
    }

    pub fn length(&self) -> usize {
        self.tracks.len()
    }

    pub fn format(&self, index: usize) -> Option<&Arc<Format>> {
        self.formats.get(index)
    }

    pub fn formats(&self) -> &[Arc<Format>] {
        &self.formats
    }

    pub fn index_in_track_group(&self, index: usize) -> Option<usize> {
        self.tracks.get(index).copied()
    }

    pub fn index_of(&self, format: &Arc<Format>) -> Option<usize> {
        self.formats.iter().position(|f| Arc::ptr_eq(f, format))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) -> AbrResult<()> {
        if self.enabled {
            return Err(AbrError::AlreadyEnabled);
        }
        self.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self) -> AbrResult<()> {
        if !self.enabled {
            return Err(AbrError::NotEnabled);
        }
        self.enabled = false;
        Ok(())
    }

    pub fn ensure_enabled(&self) -> AbrResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(AbrError::NotEnabled)
        }
    }

    pub fn is_excluded(&self, index: usize, now: Instant) -> bool {
        self.excluded_until
            .get(index)
            .copied()
            .flatten()
            .is_some_and(|until| until > now)
    }

    pub fn exclude(&mut self, index: usize, duration: Duration, now: Instant) -> AbrResult<bool> {
        let len = self.length();
        if index >= len {
            return Err(AbrError::TrackIndexOutOfRange { index, len });
        }
        let others_available = (0..len).any(|i| i != index && !self.is_excluded(i, now));
        if !others_available {
            debug!(index, "refusing to exclude the last available track");
            return Ok(false);
        }
        let until = now + duration;
        let slot = &mut self.excluded_until[index];
        *slot = Some(slot.map_or(until, |prev| prev.max(until)));
        debug!(
            index,
            format = %self.formats[index].id,
            ?duration,
            "track excluded"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> TrackGroup {
        TrackGroup::new(
            "video",
            vec![
                Arc::new(Format::new("480p", 1_000_000)),
                Arc::new(Format::new("1080p", 5_000_000)),
                Arc::new(Format::new("720p", 2_500_000)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn tracks_sorted_by_decreasing_bitrate() {
        let base = BaseTrackSelection::new(group(), &[0, 1, 2]).unwrap();
        let ids: Vec<_> = base.formats().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["1080p", "720p", "480p"]);
        assert_eq!(base.index_in_track_group(0), Some(1));
        assert_eq!(base.index_of(&group().formats()[0]), None);
        assert_eq!(base.index_of(&base.formats()[2].clone()), Some(2));
    }

    #[test]
    fn invalid_tracks_are_rejected() {
        assert_eq!(
            BaseTrackSelection::new(group(), &[]).unwrap_err(),
            AbrError::EmptySelection
        );
        assert_eq!(
            BaseTrackSelection::new(group(), &[0, 7]).unwrap_err(),
            AbrError::TrackIndexOutOfRange { index: 7, len: 3 }
        );
    }

    #[test]
    fn enable_disable_state_machine() {
        let mut base = BaseTrackSelection::new(group(), &[0]).unwrap();
        assert_eq!(base.disable(), Err(AbrError::NotEnabled));
        assert_eq!(base.ensure_enabled(), Err(AbrError::NotEnabled));
        base.enable().unwrap();
        assert_eq!(base.enable(), Err(AbrError::AlreadyEnabled));
        base.disable().unwrap();
        base.enable().unwrap();
    }

    #[test]
    fn exclusion_never_starves() {
        let mut base = BaseTrackSelection::new(group(), &[0, 1, 2]).unwrap();
        let now = Instant::now();
        let minute = Duration::from_secs(60);

        assert_eq!(base.exclude(0, minute, now), Ok(true));
        assert_eq!(base.exclude(1, minute, now), Ok(true));
        assert_eq!(base.exclude(2, minute, now), Ok(false));
        assert!(!base.is_excluded(2, now));
        assert_eq!((0..3).filter(|i| !base.is_excluded(*i, now)).count(), 1);
    }

    #[test]
    fn exclusion_expires() {
        let mut base = BaseTrackSelection::new(group(), &[0, 1]).unwrap();
        let now = Instant::now();
        base.exclude(0, Duration::from_secs(5), now).unwrap();
        assert!(base.is_excluded(0, now + Duration::from_secs(4)));
        assert!(!base.is_excluded(0, now + Duration::from_secs(5)));

        // Once expired, the other track may be excluded.
        assert_eq!(
            base.exclude(1, Duration::from_secs(5), now + Duration::from_secs(6)),
            Ok(true)
        );
    }

    #[test]
    fn exclude_out_of_range() {
        let mut base = BaseTrackSelection::new(group(), &[0, 1]).unwrap();
        assert_eq!(
            base.exclude(2, Duration::from_secs(1), Instant::now()),
            Err(AbrError::TrackIndexOutOfRange { index: 2, len: 2 })
        );
    }
}
