use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use cadenza_bandwidth::BandwidthMeter;
use cadenza_chunk::{ChunkIterator, Format, MediaChunk, SelectionReason, TrackGroup};
use tracing::debug;

use crate::{
    base::BaseTrackSelection,
    error::{AbrError, AbrResult},
    options::AbrOptions,
    selection::{SelectionInput, TrackSelection},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BufferEvaluation {
    at: Instant,
    queue_len: usize,
    queue_end: Duration,
}

/// Bandwidth-driven selection with buffer-based hysteresis.
///
/// The ideal track is the highest bitrate that fits the effective bandwidth
/// (estimate divided by the safety factor), or the lowest available track
/// when none fits. Switching up waits for enough buffer; switching down is
/// skipped while the buffer is deep.
pub struct AdaptiveTrackSelection {
    base: BaseTrackSelection,
    meter: Arc<dyn BandwidthMeter>,
    options: AbrOptions,
    selected: usize,
    reason: SelectionReason,
    playback_speed: f32,
    /// Per-track bitrates behind the last selection update.
    last_bitrates: Option<Vec<u64>>,
    last_buffer_evaluation: Option<BufferEvaluation>,
}

impl AdaptiveTrackSelection {
    /// # Errors
    ///
    /// See [`BaseTrackSelection::new`].
    pub fn new(
        group: TrackGroup,
        tracks: &[usize],
        meter: Arc<dyn BandwidthMeter>,
        options: AbrOptions,
    ) -> AbrResult<Self> {
        let base = BaseTrackSelection::new(group, tracks)?;
        let mut selection = Self {
            base,
            meter,
            options,
            selected: 0,
            reason: SelectionReason::Initial,
            playback_speed: 1.0,
            last_bitrates: None,
            last_buffer_evaluation: None,
        };
        let bitrates = selection.format_bitrates();
        selection.selected = selection.ideal_index(&bitrates, Instant::now());
        Ok(selection)
    }

    pub fn options(&self) -> &AbrOptions {
        &self.options
    }

    fn format_bitrates(&self) -> Vec<u64> {
        self.base.formats().iter().map(|f| f.bitrate).collect()
    }

    /// Bitrate of each track's next chunk, falling back to the format's
    /// declared bitrate. Iterators are left rewound.
    fn chunk_bitrates(&self, iterators: &mut [Box<dyn ChunkIterator>]) -> Vec<u64> {
        let mut bitrates = self.format_bitrates();
        for (bitrate, it) in bitrates.iter_mut().zip(iterators.iter_mut()) {
            it.reset();
            if it.next()
                && let Ok(Some(chunk_bitrate)) = it.chunk_bitrate()
            {
                *bitrate = chunk_bitrate;
            }
            it.reset();
        }
        bitrates
    }

    fn effective_bitrate(&self) -> f64 {
        let estimate = self.meter.bitrate_estimate() as f64;
        (estimate / self.options.throughput_safety_factor.max(f64::EPSILON)).max(0.0)
    }

    fn fits(&self, bitrate: u64, effective: f64, ratio: f64) -> bool {
        (bitrate as f64) * f64::from(self.playback_speed) * ratio <= effective
    }

    fn ideal_index_with(&self, bitrates: &[u64], now: Instant, ratio: f64) -> usize {
        let effective = self.effective_bitrate();
        let mut lowest_available = None;
        for (index, &bitrate) in bitrates.iter().enumerate() {
            if self.base.is_excluded(index, now) {
                continue;
            }
            if self.fits(bitrate, effective, ratio) {
                return index;
            }
            lowest_available = Some(index);
        }
        lowest_available.unwrap_or(self.selected)
    }

    fn ideal_index(&self, bitrates: &[u64], now: Instant) -> usize {
        self.ideal_index_with(bitrates, now, 1.0)
    }

    /// Track to load next with `buffered` media ahead, switching away from
    /// the current one only past the buffer thresholds. Going up also needs
    /// bandwidth headroom.
    fn hysteresis_target(
        &self,
        bitrates: &[u64],
        now: Instant,
        buffered: Duration,
        available: Option<Duration>,
    ) -> usize {
        let previous = self.selected;
        let ideal = self.ideal_index(bitrates, now);
        if self.base.is_excluded(previous, now) {
            return ideal;
        }
        if ideal < previous {
            if buffered < self.options.quality_increase_threshold(available) {
                return previous;
            }
            let with_headroom =
                self.ideal_index_with(bitrates, now, self.options.up_hysteresis_ratio);
            return with_headroom.min(previous);
        }
        if ideal > previous && buffered >= self.options.max_duration_for_quality_decrease {
            return previous;
        }
        ideal
    }

    fn switch_to(&mut self, next: usize, buffered: Duration, now: Instant) {
        let previous = self.selected;
        if next == previous {
            return;
        }
        self.selected = next;
        self.reason = SelectionReason::Adaptive;
        debug!(
            from = %self.base.formats()[previous].id,
            to = %self.base.formats()[next].id,
            estimate = self.meter.bitrate_estimate(),
            ?buffered,
            previous_excluded = self.base.is_excluded(previous, now),
            "adaptive track switch"
        );
    }

    fn should_reevaluate(&self, queue: &[MediaChunk], now: Instant) -> bool {
        let Some(last) = self.last_buffer_evaluation else {
            return true;
        };
        let queue_end = queue.last().map(MediaChunk::end_time).unwrap_or_default();
        now.saturating_duration_since(last.at) >= self.options.min_time_between_buffer_reevaluation
            || last.queue_len != queue.len()
            || last.queue_end != queue_end
    }
}

impl TrackSelection for AdaptiveTrackSelection {
    fn group(&self) -> &TrackGroup {
        self.base.group()
    }

    fn length(&self) -> usize {
        self.base.length()
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
        self.base.enable()?;
        self.last_buffer_evaluation = None;
        Ok(())
    }

    fn disable(&mut self) -> AbrResult<()> {
        self.base.disable()
    }

    fn is_enabled(&self) -> bool {
        self.base.is_enabled()
    }

    fn selected_index(&self) -> usize {
        self.selected
    }

    fn selected_format(&self) -> &Arc<Format> {
        &self.base.formats()[self.selected]
    }

    fn selection_reason(&self) -> SelectionReason {
        self.reason
    }

    fn update_selected_track(
        &mut self,
        input: &SelectionInput,
        queue: &[MediaChunk],
        iterators: &mut [Box<dyn ChunkIterator>],
    ) -> AbrResult<()> {
        self.base.ensure_enabled()?;
        if !iterators.is_empty() && iterators.len() != self.length() {
            return Err(AbrError::IteratorCountMismatch {
                expected: self.length(),
                actual: iterators.len(),
            });
        }

        let now = input.now;
        let bitrates = self.chunk_bitrates(iterators);

        if queue.is_empty() && self.reason == SelectionReason::Initial {
            // Nothing buffered yet: take the ideal track without hysteresis.
            self.selected = self.ideal_index(&bitrates, now);
            debug!(
                selected = self.selected,
                format = %self.selected_format().id,
                "initial track selection"
            );
        } else {
            let next = self.hysteresis_target(
                &bitrates,
                now,
                input.buffered_duration,
                input.available_duration,
            );
            self.switch_to(next, input.buffered_duration, now);
        }
        self.last_bitrates = Some(bitrates);
        Ok(())
    }

    fn evaluate_queue_size(
        &mut self,
        playback_position: Duration,
        queue: &[MediaChunk],
        now: Instant,
    ) -> AbrResult<usize> {
        self.base.ensure_enabled()?;
        if !self.should_reevaluate(queue, now) {
            return Ok(queue.len());
        }
        self.last_buffer_evaluation = Some(BufferEvaluation {
            at: now,
            queue_len: queue.len(),
            queue_end: queue.last().map(MediaChunk::end_time).unwrap_or_default(),
        });

        let Some(last) = queue.last() else {
            return Ok(0);
        };
        let retain = self.options.min_duration_to_retain_after_discard;
        let buffered = last.end_time().saturating_sub(playback_position);
        if buffered < retain {
            return Ok(queue.len());
        }

        // Same decision a selection update makes with this buffer.
        let bitrates = self
            .last_bitrates
            .clone()
            .unwrap_or_else(|| self.format_bitrates());
        let target = self.hysteresis_target(&bitrates, now, buffered, None);
        self.switch_to(target, buffered, now);

        let selected = &self.base.formats()[self.selected];
        for (index, chunk) in queue.iter().enumerate() {
            let ahead = chunk.start_time().saturating_sub(playback_position);
            if ahead >= retain && !Arc::ptr_eq(chunk.format(), selected) {
                debug!(
                    retain = index,
                    discard = queue.len() - index,
                    selected = %selected.id,
                    "queued chunks no longer match the selected track"
                );
                return Ok(index);
            }
        }
        Ok(queue.len())
    }

    fn exclude(&mut self, index: usize, duration: Duration, now: Instant) -> AbrResult<bool> {
        self.base.exclude(index, duration, now)
    }

    fn is_excluded(&self, index: usize, now: Instant) -> bool {
        self.base.is_excluded(index, now)
    }

    fn on_playback_speed(&mut self, speed: f32) {
        if speed > 0.0 {
            self.playback_speed = speed;
        }
    }

    fn on_discontinuity(&mut self) {
        self.last_buffer_evaluation = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cadenza_bandwidth::BandwidthMeterMock;
    use cadenza_chunk::{ChunkDescriptor, ChunkListIterator, DataType, EmptyChunkIterator};
    use cadenza_net::{DataSpec, RangeSpec};
    use cadenza_test_utils::FixedBandwidthMeter;
    use rstest::rstest;
    use unimock::{MockFn, Unimock, matching};
    use url::Url;

    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn group() -> TrackGroup {
        TrackGroup::new(
            "video",
            vec![
                Arc::new(Format::new("480p", 1_000_000).with_resolution(854, 480)),
                Arc::new(Format::new("720p", 2_500_000).with_resolution(1280, 720)),
            ],
        )
        .unwrap()
    }

    fn selection(meter: Arc<dyn BandwidthMeter>, options: AbrOptions) -> AdaptiveTrackSelection {
        let mut selection = AdaptiveTrackSelection::new(group(), &[0, 1], meter, options).unwrap();
        selection.enable().unwrap();
        selection
    }

    fn descriptor(format: &Arc<Format>, index: usize, secs: u64) -> ChunkDescriptor {
        let start = SECOND * (index as u32) * secs as u32;
        ChunkDescriptor {
            format: Arc::clone(format),
            track_index: 0,
            chunk_index: index,
            start,
            end: start + SECOND * secs as u32,
            data_spec: DataSpec::new(Url::parse("https://cdn.test/seg.m4s").unwrap()),
            data_type: DataType::Media,
            selection_reason: SelectionReason::Initial,
            location_index: 0,
        }
    }

    fn queue_of(format: &Arc<Format>, count: usize, secs: u64) -> Vec<MediaChunk> {
        (0..count)
            .map(|i| MediaChunk::new(descriptor(format, i, secs), None, 0))
            .collect()
    }

    fn input(position: Duration, buffered: Duration, now: Instant) -> SelectionInput {
        SelectionInput {
            playback_position: position,
            buffered_duration: buffered,
            available_duration: None,
            now,
        }
    }

    #[test]
    fn initial_selection_follows_estimate() {
        let meter = Unimock::new(
            BandwidthMeterMock::bitrate_estimate
                .each_call(matching!())
                .returns(5_000_000_u64),
        );
        let selection = selection(Arc::new(meter), AbrOptions::default());

        assert_eq!(selection.selected_format().id, "720p");
        assert_eq!(selection.selection_reason(), SelectionReason::Initial);
    }

    #[rstest]
    #[case(10_000_000, "720p")]
    #[case(3_750_000, "720p")]
    #[case(3_700_000, "480p")]
    #[case(100_000, "480p")]
    fn ideal_track_respects_safety_factor(#[case] estimate: u64, #[case] expected: &str) {
        let meter = FixedBandwidthMeter::new(estimate);
        let selection = selection(Arc::new(meter), AbrOptions::default());
        assert_eq!(selection.selected_format().id, expected);
    }

    #[test]
    fn bandwidth_drop_switches_down_and_discards_unplayed_chunks() {
        let meter = FixedBandwidthMeter::new(5_000_000);
        let options = AbrOptions::default()
            .with_min_duration_to_retain_after_discard(10 * SECOND);
        let mut selection = selection(Arc::new(meter.clone()), options);
        let hd = Arc::clone(selection.selected_format());
        assert_eq!(hd.id, "720p");

        let queue = queue_of(&hd, 5, 4);
        let now = Instant::now();

        meter.set_bitrate_estimate(1_800_000);
        selection
            .update_selected_track(&input(Duration::ZERO, 20 * SECOND, now), &queue, &mut [])
            .unwrap();
        assert_eq!(selection.selected_format().id, "480p");
        assert_eq!(selection.selection_reason(), SelectionReason::Adaptive);

        // Chunks starting at 0, 4 and 8 s are inside the retained window.
        let retain = selection
            .evaluate_queue_size(Duration::ZERO, &queue, now)
            .unwrap();
        assert_eq!(retain, 3);
    }

    #[test]
    fn deep_buffer_holds_quality_on_drop() {
        let meter = FixedBandwidthMeter::new(5_000_000);
        let mut selection = selection(Arc::new(meter.clone()), AbrOptions::default());
        let hd = Arc::clone(selection.selected_format());
        let queue = queue_of(&hd, 8, 4);

        meter.set_bitrate_estimate(1_800_000);
        selection
            .update_selected_track(
                &input(Duration::ZERO, 30 * SECOND, Instant::now()),
                &queue,
                &mut [],
            )
            .unwrap();
        assert_eq!(selection.selected_format().id, "720p");
    }

    #[test]
    fn quality_increase_waits_for_buffer() {
        let meter = FixedBandwidthMeter::new(1_000_000);
        let mut selection = selection(Arc::new(meter.clone()), AbrOptions::default());
        let sd = Arc::clone(selection.selected_format());
        assert_eq!(sd.id, "480p");
        let queue = queue_of(&sd, 2, 4);
        let now = Instant::now();

        meter.set_bitrate_estimate(20_000_000);
        selection
            .update_selected_track(&input(Duration::ZERO, 8 * SECOND, now), &queue, &mut [])
            .unwrap();
        assert_eq!(selection.selected_format().id, "480p");

        selection
            .update_selected_track(&input(Duration::ZERO, 12 * SECOND, now), &queue, &mut [])
            .unwrap();
        assert_eq!(selection.selected_format().id, "720p");
        assert_eq!(selection.selection_reason(), SelectionReason::Adaptive);
    }

    #[test]
    fn up_switch_needs_headroom() {
        // 720p fits the effective rate but not with the hysteresis margin.
        let meter = FixedBandwidthMeter::new(1_000_000);
        let mut selection = selection(Arc::new(meter.clone()), AbrOptions::default());
        let queue = queue_of(selection.selected_format(), 3, 4);

        meter.set_bitrate_estimate(4_000_000);
        selection
            .update_selected_track(
                &input(Duration::ZERO, 12 * SECOND, Instant::now()),
                &queue,
                &mut [],
            )
            .unwrap();
        assert_eq!(selection.selected_format().id, "480p");
    }

    #[test]
    fn near_live_edge_lowers_increase_threshold() {
        let meter = FixedBandwidthMeter::new(1_000_000);
        let mut selection = selection(Arc::new(meter.clone()), AbrOptions::default());
        let queue = queue_of(selection.selected_format(), 1, 4);

        meter.set_bitrate_estimate(20_000_000);
        let mut at_edge = input(Duration::ZERO, 4 * SECOND, Instant::now());
        at_edge.available_duration = Some(4 * SECOND);
        selection
            .update_selected_track(&at_edge, &queue, &mut [])
            .unwrap();
        assert_eq!(selection.selected_format().id, "720p");
    }

    #[test]
    fn excluded_current_track_switches_immediately() {
        let meter = FixedBandwidthMeter::new(5_000_000);
        let mut selection = selection(Arc::new(meter), AbrOptions::default());
        let queue = queue_of(selection.selected_format(), 8, 4);
        let now = Instant::now();

        assert_eq!(selection.exclude(0, 60 * SECOND, now), Ok(true));
        selection
            .update_selected_track(&input(Duration::ZERO, 32 * SECOND, now), &queue, &mut [])
            .unwrap();
        assert_eq!(selection.selected_format().id, "480p");
        assert_eq!(selection.excluded_count(now), 1);
    }

    #[test]
    fn playback_speed_scales_required_bitrate() {
        let meter = FixedBandwidthMeter::new(5_000_000);
        let mut selection = selection(Arc::new(meter), AbrOptions::default());
        let queue = queue_of(selection.selected_format(), 2, 4);

        selection.on_playback_speed(2.0);
        selection
            .update_selected_track(
                &input(Duration::ZERO, 8 * SECOND, Instant::now()),
                &queue,
                &mut [],
            )
            .unwrap();
        assert_eq!(selection.selected_format().id, "480p");
    }

    #[test]
    fn chunk_bitrates_override_declared_bitrates() {
        let meter = FixedBandwidthMeter::new(3_000_000);
        let mut selection = selection(Arc::new(meter), AbrOptions::default());
        assert_eq!(selection.selected_format().id, "480p");

        // The next 720p chunk is small: 500 KB over 4 s is 1 Mbps.
        let hd = Arc::clone(selection.format(0).unwrap());
        let mut small = descriptor(&hd, 0, 4);
        small.data_spec = small
            .data_spec
            .with_range(RangeSpec::from_offset_len(0, 500_000).unwrap());
        let mut iterators: Vec<Box<dyn ChunkIterator>> = vec![
            Box::new(ChunkListIterator::new(vec![small])),
            Box::new(EmptyChunkIterator),
        ];
        let queue = queue_of(selection.selected_format(), 3, 4);

        selection
            .update_selected_track(
                &input(Duration::ZERO, 12 * SECOND, Instant::now()),
                &queue,
                &mut iterators,
            )
            .unwrap();
        assert_eq!(selection.selected_format().id, "720p");
        // Iterators are rewound.
        assert!(iterators[0].next());
    }

    #[test]
    fn iterator_count_must_match() {
        let meter = FixedBandwidthMeter::new(5_000_000);
        let mut selection = selection(Arc::new(meter), AbrOptions::default());
        let mut iterators: Vec<Box<dyn ChunkIterator>> = vec![Box::new(EmptyChunkIterator)];
        let input = input(Duration::ZERO, Duration::ZERO, Instant::now());
        let result = selection.update_selected_track(&input, &[], &mut iterators);
        assert_eq!(
            result,
            Err(AbrError::IteratorCountMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn decisions_require_enabled_selection() {
        let meter = FixedBandwidthMeter::new(5_000_000);
        let mut selection =
            AdaptiveTrackSelection::new(group(), &[0, 1], Arc::new(meter), AbrOptions::default())
                .unwrap();
        let now = Instant::now();
        assert_eq!(
            selection.update_selected_track(
                &input(Duration::ZERO, Duration::ZERO, now),
                &[],
                &mut []
            ),
            Err(AbrError::NotEnabled)
        );
        assert_eq!(
            selection.evaluate_queue_size(Duration::ZERO, &[], now),
            Err(AbrError::NotEnabled)
        );
    }

    #[test]
    fn hysteresis_band_keeps_the_queue() {
        // 720p is ideal at 4 Mbps but lacks the up-switch headroom.
        let meter = FixedBandwidthMeter::new(1_000_000);
        let mut selection = selection(Arc::new(meter.clone()), AbrOptions::default());
        let sd = Arc::clone(selection.selected_format());
        let queue = queue_of(&sd, 10, 4);
        let start = Instant::now();

        meter.set_bitrate_estimate(4_000_000);
        for round in 0..3_u32 {
            let now = start + 3 * SECOND * round;
            selection
                .update_selected_track(&input(Duration::ZERO, 40 * SECOND, now), &queue, &mut [])
                .unwrap();
            assert_eq!(selection.selected_format().id, "480p");
            assert_eq!(
                selection.evaluate_queue_size(Duration::ZERO, &queue, now),
                Ok(queue.len())
            );
        }
        assert_eq!(selection.selection_reason(), SelectionReason::Initial);
    }

    #[test]
    fn up_switch_discards_lower_quality_once() {
        let meter = FixedBandwidthMeter::new(1_000_000);
        let mut selection = selection(Arc::new(meter.clone()), AbrOptions::default());
        let sd = Arc::clone(selection.selected_format());
        let queue = queue_of(&sd, 10, 4);
        let now = Instant::now();

        meter.set_bitrate_estimate(20_000_000);
        // Chunks starting at 28, 32 and 36 s are past the 25 s retained.
        assert_eq!(selection.evaluate_queue_size(Duration::ZERO, &queue, now), Ok(7));
        assert_eq!(selection.selected_format().id, "720p");
        assert_eq!(selection.selection_reason(), SelectionReason::Adaptive);

        let later = now + 3 * SECOND;
        let position = 3 * SECOND;
        selection
            .update_selected_track(&input(position, 25 * SECOND, later), &queue[..7], &mut [])
            .unwrap();
        assert_eq!(selection.selected_format().id, "720p");
        assert_eq!(
            selection.evaluate_queue_size(position, &queue[..7], later),
            Ok(7)
        );
    }

    #[test]
    fn short_buffer_is_never_discarded() {
        let meter = FixedBandwidthMeter::new(5_000_000);
        let mut selection = selection(Arc::new(meter.clone()), AbrOptions::default());
        let queue = queue_of(selection.selected_format(), 3, 4);

        meter.set_bitrate_estimate(100_000);
        let retain = selection
            .evaluate_queue_size(Duration::ZERO, &queue, Instant::now())
            .unwrap();
        assert_eq!(retain, queue.len());
    }

    #[test]
    fn queue_reevaluation_is_throttled() {
        let meter = FixedBandwidthMeter::new(5_000_000);
        let options = AbrOptions::default()
            .with_min_duration_to_retain_after_discard(10 * SECOND);
        let mut selection = selection(Arc::new(meter.clone()), options);
        let queue = queue_of(selection.selected_format(), 5, 4);
        let now = Instant::now();

        assert_eq!(selection.evaluate_queue_size(Duration::ZERO, &queue, now), Ok(5));

        meter.set_bitrate_estimate(100_000);
        assert_eq!(
            selection.evaluate_queue_size(Duration::ZERO, &queue, now + SECOND),
            Ok(5)
        );
        assert_eq!(
            selection.evaluate_queue_size(Duration::ZERO, &queue, now + 2 * SECOND),
            Ok(3)
        );
    }
}
