use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use cadenza_abr::{SelectionInput, TrackSelection};
use cadenza_chunk::{
    ChunkDescriptor, ChunkError, ChunkIterator, DataType, Format, MediaChunk, SegmentChunkIterator,
    SelectionReason, TrackManifest,
};
use cadenza_policy::{FallbackOptions, FallbackType, LoadErrorHandlingPolicy, LoadErrorInfo};
use tracing::{debug, trace, warn};

use crate::{error::LoaderResult, exclusion::LocationExclusionList};

/// What a [`ChunkSource`] wants loaded next.
#[derive(Clone, Debug)]
pub enum NextChunk {
    Load(Box<ChunkDescriptor>),
    /// Every chunk up to the end of the content is queued.
    EndOfStream,
    /// Nothing to load yet; a live timeline has not published the next chunk.
    Unavailable,
}

/// A fallback the source applied after a failed load.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedFallback {
    pub fallback_type: FallbackType,
    pub exclusion_duration: Duration,
    /// Excluded location URL or format id.
    pub excluded: String,
}

/// Supplies the chunks of one stream and owns its track selection.
///
/// Runs on the control context only.
pub trait ChunkSource: Send {
    /// Decide the next chunk to load after `queue`.
    ///
    /// # Errors
    ///
    /// Propagates track selection and manifest errors.
    fn next_chunk(
        &mut self,
        input: &SelectionInput,
        queue: &[MediaChunk],
    ) -> LoaderResult<NextChunk>;

    fn on_chunk_load_completed(&mut self, _chunk: &ChunkDescriptor) {}

    /// Queued chunks were released unplayed and will be loaded again.
    fn on_queue_discarded(&mut self, _discarded: &[ChunkDescriptor]) {}

    /// Consult `policy` for a fallback after `chunk` failed and apply it.
    ///
    /// # Errors
    ///
    /// Propagates track selection errors.
    fn on_chunk_load_error(
        &mut self,
        chunk: &ChunkDescriptor,
        info: &LoadErrorInfo,
        policy: &dyn LoadErrorHandlingPolicy,
        now: Instant,
    ) -> LoaderResult<Option<AppliedFallback>>;

    /// Number of queued chunks to keep. Only called while nothing loads.
    ///
    /// # Errors
    ///
    /// Propagates track selection errors.
    fn preferred_queue_size(
        &mut self,
        playback_position: Duration,
        queue: &[MediaChunk],
        now: Instant,
    ) -> LoaderResult<usize>;

    /// # Errors
    ///
    /// Propagates track selection errors.
    fn should_cancel_load(
        &self,
        _playback_position: Duration,
        _loading: &ChunkDescriptor,
        _queue: &[MediaChunk],
    ) -> LoaderResult<bool> {
        Ok(false)
    }

    fn available_duration(&self, playback_position: Duration) -> Option<Duration>;

    fn selected_format(&self) -> Arc<Format>;

    fn selection_reason(&self) -> SelectionReason;

    fn track_id(&self) -> &str;

    fn on_playback_speed(&mut self, _speed: f32) {}

    fn on_discontinuity(&mut self) {}

    fn release(&mut self) {}
}

/// [`ChunkSource`] over a [`TrackManifest`], choosing tracks with a
/// [`TrackSelection`] and locations with a [`LocationExclusionList`].
pub struct AdaptiveChunkSource {
    manifest: Arc<TrackManifest>,
    selection: Box<dyn TrackSelection>,
    locations: LocationExclusionList,
    /// Format whose initialization segment is loaded.
    initialized: Option<Arc<Format>>,
}

impl AdaptiveChunkSource {
    /// Wrap `selection`, enabling it if needed.
    ///
    /// # Errors
    ///
    /// [`LoaderError::Chunk`](crate::LoaderError) if a track of the selection
    /// has no timeline in `manifest`.
    pub fn new(
        manifest: Arc<TrackManifest>,
        mut selection: Box<dyn TrackSelection>,
    ) -> LoaderResult<Self> {
        for index in 0..selection.length() {
            let track = selection
                .index_in_track_group(index)
                .ok_or(ChunkError::NoSuchElement)?;
            manifest.timeline(track)?;
        }
        if !selection.is_enabled() {
            selection.enable()?;
        }
        let locations = LocationExclusionList::new(manifest.locations().to_vec());
        Ok(Self {
            manifest,
            selection,
            locations,
            initialized: None,
        })
    }

    pub fn manifest(&self) -> &Arc<TrackManifest> {
        &self.manifest
    }

    pub fn selection(&self) -> &dyn TrackSelection {
        self.selection.as_ref()
    }

    pub fn locations(&self) -> &LocationExclusionList {
        &self.locations
    }

    /// Descriptors of the selected track covering `[start, end)`, ascending
    /// and without gaps.
    ///
    /// # Errors
    ///
    /// Manifest errors for the selected track or its location.
    pub fn chunks_in_window(
        &self,
        start: Duration,
        end: Duration,
        now: Instant,
    ) -> LoaderResult<Vec<ChunkDescriptor>> {
        let track = self.selection.selected_index_in_track_group();
        let timeline = self.manifest.timeline(track)?;
        let location_index = self
            .locations
            .select(now)
            .ok_or(ChunkError::NoLocations)?;
        timeline
            .chunks_in_window(start, end)
            .map(|index| self.media_descriptor(track, index, location_index))
            .collect()
    }

    fn location_iterators(
        &self,
        from: Duration,
        location_index: usize,
    ) -> LoaderResult<Vec<Box<dyn ChunkIterator>>> {
        let location = self
            .locations
            .location(location_index)
            .ok_or(ChunkError::NoLocations)?;
        (0..self.selection.length())
            .map(|index| -> LoaderResult<Box<dyn ChunkIterator>> {
                let track = self
                    .selection
                    .index_in_track_group(index)
                    .ok_or(ChunkError::NoSuchElement)?;
                let timeline = Arc::clone(self.manifest.timeline(track)?);
                Ok(Box::new(SegmentChunkIterator::starting_at(
                    timeline,
                    location.clone(),
                    from,
                )))
            })
            .collect()
    }

    fn media_descriptor(
        &self,
        track: usize,
        index: usize,
        location_index: usize,
    ) -> LoaderResult<ChunkDescriptor> {
        let timeline = self.manifest.timeline(track)?;
        let segment = timeline.segment(index).ok_or(ChunkError::NoSuchElement)?;
        let location = self
            .locations
            .location(location_index)
            .ok_or(ChunkError::NoLocations)?;
        Ok(ChunkDescriptor {
            format: Arc::clone(self.manifest.format(track)?),
            track_index: track,
            chunk_index: index,
            start: segment.start,
            end: segment.end(),
            data_spec: location.resolve(segment)?,
            data_type: DataType::Media,
            selection_reason: self.selection.selection_reason(),
            location_index,
        })
    }

    fn init_descriptor(
        &self,
        track: usize,
        at: Duration,
        location_index: usize,
    ) -> LoaderResult<Option<ChunkDescriptor>> {
        let format = self.manifest.format(track)?;
        if self
            .initialized
            .as_ref()
            .is_some_and(|f| Arc::ptr_eq(f, format))
        {
            return Ok(None);
        }
        let timeline = self.manifest.timeline(track)?;
        let Some(init) = timeline.init_segment() else {
            return Ok(None);
        };
        let location = self
            .locations
            .location(location_index)
            .ok_or(ChunkError::NoLocations)?;
        Ok(Some(ChunkDescriptor {
            format: Arc::clone(format),
            track_index: track,
            chunk_index: 0,
            start: at,
            end: at,
            data_spec: location.resolve(init)?,
            data_type: DataType::MediaInitialization,
            selection_reason: self.selection.selection_reason(),
            location_index,
        }))
    }
}

impl ChunkSource for AdaptiveChunkSource {
    fn next_chunk(
        &mut self,
        input: &SelectionInput,
        queue: &[MediaChunk],
    ) -> LoaderResult<NextChunk> {
        let load_position = queue
            .last()
            .map_or(input.playback_position, MediaChunk::end_time);
        let location_index = self
            .locations
            .select(input.now)
            .ok_or(ChunkError::NoLocations)?;

        let mut iterators = self.location_iterators(load_position, location_index)?;
        self.selection
            .update_selected_track(input, queue, &mut iterators)?;

        let track = self.selection.selected_index_in_track_group();
        let timeline = self.manifest.timeline(track)?;
        let index = if load_position < timeline.start() && !timeline.is_empty() {
            Some(0)
        } else {
            timeline.segment_index_at(load_position)
        };
        let Some(index) = index else {
            let next = if timeline.is_live() {
                NextChunk::Unavailable
            } else {
                NextChunk::EndOfStream
            };
            trace!(track, ?load_position, ?next, "no chunk at load position");
            return Ok(next);
        };

        let start = timeline
            .segment(index)
            .map_or(load_position, |segment| segment.start);
        if let Some(init) = self.init_descriptor(track, start, location_index)? {
            return Ok(NextChunk::Load(Box::new(init)));
        }
        let descriptor = self.media_descriptor(track, index, location_index)?;
        trace!(
            track,
            chunk = index,
            location = location_index,
            url = %descriptor.data_spec.url,
            "next chunk"
        );
        Ok(NextChunk::Load(Box::new(descriptor)))
    }

    fn on_chunk_load_completed(&mut self, chunk: &ChunkDescriptor) {
        if chunk.data_type == DataType::MediaInitialization {
            self.initialized = Some(Arc::clone(&chunk.format));
        }
    }

    fn on_queue_discarded(&mut self, discarded: &[ChunkDescriptor]) {
        if discarded
            .iter()
            .any(|d| d.data_type == DataType::MediaInitialization)
        {
            trace!("initialization discarded");
            self.initialized = None;
        }
    }

    fn on_chunk_load_error(
        &mut self,
        chunk: &ChunkDescriptor,
        info: &LoadErrorInfo,
        policy: &dyn LoadErrorHandlingPolicy,
        now: Instant,
    ) -> LoaderResult<Option<AppliedFallback>> {
        let options = FallbackOptions::new(
            self.locations.len(),
            self.locations.excluded_count(now),
            self.selection.length(),
            self.selection.excluded_count(now),
        );
        let Some(selection) = policy.fallback_selection_for(&options, info) else {
            return Ok(None);
        };
        if !options.is_fallback_available(selection.fallback_type) {
            debug!(?selection, ?options, "policy chose an unavailable fallback");
            return Ok(None);
        }

        let duration = selection.exclusion_duration;
        let excluded = match selection.fallback_type {
            FallbackType::Location => {
                let url = self
                    .locations
                    .location(chunk.location_index)
                    .map(|l| l.url.to_string());
                match url {
                    Some(url) if self.locations.exclude(chunk.location_index, duration, now) => url,
                    _ => return Ok(None),
                }
            }
            FallbackType::Track => {
                let Some(index) = self.selection.index_of(&chunk.format) else {
                    return Ok(None);
                };
                if !self.selection.exclude(index, duration, now)? {
                    return Ok(None);
                }
                chunk.format.id.clone()
            }
        };
        debug!(
            fallback = ?selection.fallback_type,
            %excluded,
            ?duration,
            "fallback applied"
        );
        Ok(Some(AppliedFallback {
            fallback_type: selection.fallback_type,
            exclusion_duration: duration,
            excluded,
        }))
    }

    fn preferred_queue_size(
        &mut self,
        playback_position: Duration,
        queue: &[MediaChunk],
        now: Instant,
    ) -> LoaderResult<usize> {
        Ok(self
            .selection
            .evaluate_queue_size(playback_position, queue, now)?)
    }

    fn should_cancel_load(
        &self,
        playback_position: Duration,
        loading: &ChunkDescriptor,
        queue: &[MediaChunk],
    ) -> LoaderResult<bool> {
        Ok(self
            .selection
            .should_cancel_chunk_load(playback_position, loading, queue)?)
    }

    fn available_duration(&self, playback_position: Duration) -> Option<Duration> {
        self.manifest.available_duration(playback_position)
    }

    fn selected_format(&self) -> Arc<Format> {
        Arc::clone(self.selection.selected_format())
    }

    fn selection_reason(&self) -> SelectionReason {
        self.selection.selection_reason()
    }

    fn track_id(&self) -> &str {
        self.manifest.group().id()
    }

    fn on_playback_speed(&mut self, speed: f32) {
        self.selection.on_playback_speed(speed);
    }

    fn on_discontinuity(&mut self) {
        self.initialized = None;
        self.selection.on_discontinuity();
    }

    fn release(&mut self) {
        if self.selection.is_enabled()
            && let Err(error) = self.selection.disable()
        {
            warn!(%error, track = self.track_id(), "failed to disable track selection");
        }
    }
}

#[cfg(test)]
mod tests {
    use cadenza_abr::FixedTrackSelection;
    use cadenza_chunk::{
        BaseLocation, LoadEventInfo, LoadTaskId, MediaLoadData, Segment, SegmentTimeline,
        TrackManifest,
    };
    use cadenza_net::NetError;
    use cadenza_policy::{
        DefaultLoadErrorHandlingPolicy, FallbackSelection, LoadError, LoadErrorHandlingPolicyMock,
    };
    use cadenza_test_utils::{SEGMENT_DURATION, base_url, video_group, video_manifest};
    use unimock::{MockFn, Unimock, matching};

    use super::*;

    fn input(position: Duration, now: Instant) -> SelectionInput {
        SelectionInput {
            playback_position: position,
            buffered_duration: Duration::ZERO,
            available_duration: None,
            now,
        }
    }

    fn fixed_source(locations: &[url::Url], track: usize) -> AdaptiveChunkSource {
        let manifest = Arc::new(video_manifest(locations, 5, 1000));
        let selection = FixedTrackSelection::new(manifest.group().clone(), track).unwrap();
        AdaptiveChunkSource::new(manifest, Box::new(selection)).unwrap()
    }

    fn load(next: NextChunk) -> ChunkDescriptor {
        match next {
            NextChunk::Load(descriptor) => *descriptor,
            other => panic!("expected a chunk, got {other:?}"),
        }
    }

    fn error_info(descriptor: &ChunkDescriptor, error: LoadError) -> LoadErrorInfo {
        LoadErrorInfo::new(
            LoadEventInfo::new(LoadTaskId::new(1), descriptor.data_spec.clone(), Instant::now()),
            MediaLoadData::from(descriptor),
            error,
            1,
        )
    }

    #[test]
    fn first_chunk_at_playback_position() {
        let mut source = fixed_source(&[base_url("a.test")], 1);
        let now = Instant::now();
        let chunk = load(source.next_chunk(&input(Duration::from_secs(9), now), &[]).unwrap());
        assert_eq!(chunk.chunk_index, 2);
        assert_eq!(chunk.start, SEGMENT_DURATION * 2);
        assert_eq!(chunk.format.id, "720p");
        assert_eq!(chunk.data_spec.url.as_str(), "https://a.test/media/720p/seg-2.m4s");
        assert_eq!(chunk.data_type, DataType::Media);
    }

    #[test]
    fn window_chunks_are_contiguous() {
        let source = fixed_source(&[base_url("a.test")], 0);
        let chunks = source
            .chunks_in_window(Duration::from_secs(2), Duration::from_secs(13), Instant::now())
            .unwrap();
        assert_eq!(chunks.len(), 4);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(chunks[0].start <= Duration::from_secs(2));
        assert!(chunks[3].end >= Duration::from_secs(13));
    }

    #[test]
    fn end_of_stream_past_last_segment() {
        let mut source = fixed_source(&[base_url("a.test")], 0);
        let next = source
            .next_chunk(&input(Duration::from_secs(20), Instant::now()), &[])
            .unwrap();
        assert!(matches!(next, NextChunk::EndOfStream));
    }

    #[test]
    fn live_timeline_reports_unavailable() {
        let group = video_group();
        let timelines = (0..group.len())
            .map(|_| {
                SegmentTimeline::uniform("seg-$Number$.ts", 2, SEGMENT_DURATION).with_live(true)
            })
            .collect();
        let locations = vec![BaseLocation::new(base_url("a.test"), 0)];
        let manifest = TrackManifest::new(group, timelines, locations).unwrap();
        let manifest = Arc::new(manifest);
        let selection = FixedTrackSelection::new(manifest.group().clone(), 0).unwrap();
        let mut source = AdaptiveChunkSource::new(manifest, Box::new(selection)).unwrap();

        let next = source
            .next_chunk(&input(Duration::from_secs(8), Instant::now()), &[])
            .unwrap();
        assert!(matches!(next, NextChunk::Unavailable));
        assert_eq!(source.available_duration(Duration::ZERO), None);
    }

    #[test]
    fn init_segment_precedes_media_once() {
        let group = video_group();
        let timelines = (0..group.len())
            .map(|_| {
                SegmentTimeline::uniform("seg-$Number$.m4s", 3, SEGMENT_DURATION)
                    .with_init_segment(Segment::new("init.mp4", Duration::ZERO, Duration::ZERO))
            })
            .collect();
        let locations = vec![BaseLocation::new(base_url("a.test"), 0)];
        let manifest = TrackManifest::new(group, timelines, locations).unwrap();
        let manifest = Arc::new(manifest);
        let selection = FixedTrackSelection::new(manifest.group().clone(), 0).unwrap();
        let mut source = AdaptiveChunkSource::new(manifest, Box::new(selection)).unwrap();
        let now = Instant::now();

        let init = load(source.next_chunk(&input(Duration::ZERO, now), &[]).unwrap());
        assert_eq!(init.data_type, DataType::MediaInitialization);
        assert_eq!(init.start, init.end);
        source.on_chunk_load_completed(&init);

        let media = load(source.next_chunk(&input(Duration::ZERO, now), &[]).unwrap());
        assert_eq!(media.data_type, DataType::Media);
        assert_eq!(media.chunk_index, 0);
    }

    #[test]
    fn discarded_init_segment_is_loaded_again() {
        let group = video_group();
        let timelines = (0..group.len())
            .map(|_| {
                SegmentTimeline::uniform("seg-$Number$.m4s", 3, SEGMENT_DURATION)
                    .with_init_segment(Segment::new("init.mp4", Duration::ZERO, Duration::ZERO))
            })
            .collect();
        let locations = vec![BaseLocation::new(base_url("a.test"), 0)];
        let manifest = Arc::new(TrackManifest::new(group, timelines, locations).unwrap());
        let selection = FixedTrackSelection::new(manifest.group().clone(), 0).unwrap();
        let mut source = AdaptiveChunkSource::new(manifest, Box::new(selection)).unwrap();
        let now = Instant::now();

        let init = load(source.next_chunk(&input(Duration::ZERO, now), &[]).unwrap());
        source.on_chunk_load_completed(&init);
        let media = load(source.next_chunk(&input(Duration::ZERO, now), &[]).unwrap());

        // Discarding media alone keeps the loaded initialization.
        source.on_queue_discarded(std::slice::from_ref(&media));
        let next = load(source.next_chunk(&input(Duration::ZERO, now), &[]).unwrap());
        assert_eq!(next.data_type, DataType::Media);

        source.on_queue_discarded(&[init, media]);
        let next = load(source.next_chunk(&input(Duration::ZERO, now), &[]).unwrap());
        assert_eq!(next.data_type, DataType::MediaInitialization);
    }

    #[test]
    fn location_fallback_moves_to_next_location() {
        let mut source = fixed_source(&[base_url("a.test"), base_url("b.test")], 0);
        let policy = DefaultLoadErrorHandlingPolicy::default();
        let now = Instant::now();

        let chunk = load(source.next_chunk(&input(Duration::ZERO, now), &[]).unwrap());
        assert_eq!(chunk.location_index, 0);
        let gone = NetError::http_status(chunk.data_spec.url.clone(), 404);
        let info = error_info(&chunk, gone.into());

        let applied = source
            .on_chunk_load_error(&chunk, &info, &policy, now)
            .unwrap()
            .unwrap();
        assert_eq!(applied.fallback_type, FallbackType::Location);
        assert_eq!(applied.excluded, "https://a.test/media/");

        let retry = load(source.next_chunk(&input(Duration::ZERO, now), &[]).unwrap());
        assert_eq!(retry.location_index, 1);
        assert!(retry.data_spec.url.as_str().starts_with("https://b.test/"));

        // Only one location is left, so no further location fallback.
        let gone = NetError::http_status(retry.data_spec.url.clone(), 404);
        let info = error_info(&retry, gone.into());
        assert_eq!(source.on_chunk_load_error(&retry, &info, &policy, now).unwrap(), None);
    }

    #[test]
    fn unavailable_fallback_from_policy_is_ignored() {
        let mut source = fixed_source(&[base_url("a.test")], 0);
        let chunk = load(source.next_chunk(&input(Duration::ZERO, Instant::now()), &[]).unwrap());
        let info = error_info(&chunk, LoadError::Unexpected("boom".into()));

        let policy = Unimock::new(
            LoadErrorHandlingPolicyMock::fallback_selection_for
                .each_call(matching!(_, _))
                .returns(Some(FallbackSelection::new(
                    FallbackType::Track,
                    Duration::from_secs(60),
                ))),
        );
        let applied = source
            .on_chunk_load_error(&chunk, &info, &policy, Instant::now())
            .unwrap();
        assert_eq!(applied, None);
    }

    #[test]
    fn release_disables_selection() {
        let mut source = fixed_source(&[base_url("a.test")], 0);
        assert!(source.selection().is_enabled());
        source.release();
        assert!(!source.selection().is_enabled());
        assert_eq!(source.track_id(), "video");
    }

    #[test]
    fn release_is_idempotent() {
        let mut source = fixed_source(&[base_url("a.test")], 0);
        source.release();
        source.release();
        assert!(!source.selection().is_enabled());
    }
}
