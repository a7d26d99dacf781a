use std::{ops::Range, sync::Arc, time::Duration};

use cadenza_net::DataSpec;

use crate::{
    chunk::ChunkDescriptor,
    error::{ChunkError, ChunkResult},
    manifest::BaseLocation,
    timeline::SegmentTimeline,
};

/// Restartable forward cursor over upcoming chunks of one track.
///
/// A fresh iterator sits before its first element; accessors fail with
/// [`ChunkError::NoSuchElement`] until [`next`](Self::next) succeeds and again
/// once the iterator has ended.
pub trait ChunkIterator: Send {
    /// Advance. Returns whether the cursor now points at a chunk.
    fn next(&mut self) -> bool;

    fn is_ended(&self) -> bool;

    /// Rewind to before the first element.
    fn reset(&mut self);

    fn data_spec(&self) -> ChunkResult<DataSpec>;

    fn chunk_start_time(&self) -> ChunkResult<Duration>;

    fn chunk_end_time(&self) -> ChunkResult<Duration>;

    /// Bitrate of the current chunk from its declared length, if known.
    fn chunk_bitrate(&self) -> ChunkResult<Option<u64>> {
        let length = self.data_spec()?.length();
        let duration = self.chunk_end_time()?.saturating_sub(self.chunk_start_time()?);
        Ok(length.and_then(|bytes| crate::chunk::bitrate_of(bytes, duration)))
    }
}

/// Iterator with no elements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmptyChunkIterator;

impl EmptyChunkIterator {
    pub const INSTANCE: EmptyChunkIterator = EmptyChunkIterator;
}

impl ChunkIterator for EmptyChunkIterator {
    fn next(&mut self) -> bool {
        false
    }

    fn is_ended(&self) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn data_spec(&self) -> ChunkResult<DataSpec> {
        Err(ChunkError::NoSuchElement)
    }

    fn chunk_start_time(&self) -> ChunkResult<Duration> {
        Err(ChunkError::NoSuchElement)
    }

    fn chunk_end_time(&self) -> ChunkResult<Duration> {
        Err(ChunkError::NoSuchElement)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cursor {
    Before,
    At(usize),
    Ended,
}

impl Cursor {
    fn advance(self, range: &Range<usize>) -> Self {
        let candidate = match self {
            Cursor::Before => range.start,
            Cursor::At(i) => i + 1,
            Cursor::Ended => return Cursor::Ended,
        };
        if candidate < range.end {
            Cursor::At(candidate)
        } else {
            Cursor::Ended
        }
    }

    fn index(self) -> ChunkResult<usize> {
        match self {
            Cursor::At(i) => Ok(i),
            Cursor::Before | Cursor::Ended => Err(ChunkError::NoSuchElement),
        }
    }
}

/// Iterator over a range of segments of one timeline.
#[derive(Clone, Debug)]
pub struct SegmentChunkIterator {
    timeline: Arc<SegmentTimeline>,
    location: BaseLocation,
    range: Range<usize>,
    cursor: Cursor,
}

impl SegmentChunkIterator {
    /// Segments `range` of `timeline`, resolved against `location`. The range
    /// is clamped to the timeline.
    pub fn new(
        timeline: Arc<SegmentTimeline>,
        location: BaseLocation,
        range: Range<usize>,
    ) -> Self {
        let end = range.end.min(timeline.len());
        let start = range.start.min(end);
        Self {
            timeline,
            location,
            range: start..end,
            cursor: Cursor::Before,
        }
    }

    /// Segments from the one containing `from` to the end of the timeline.
    pub fn starting_at(
        timeline: Arc<SegmentTimeline>,
        location: BaseLocation,
        from: Duration,
    ) -> Self {
        let start = timeline.segment_index_at(from).unwrap_or(timeline.len());
        let end = timeline.len();
        Self::new(timeline, location, start..end)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor.index().ok()
    }

    fn current(&self) -> ChunkResult<&crate::timeline::Segment> {
        let index = self.cursor.index()?;
        self.timeline.segment(index).ok_or(ChunkError::NoSuchElement)
    }
}

impl ChunkIterator for SegmentChunkIterator {
    fn next(&mut self) -> bool {
        self.cursor = self.cursor.advance(&self.range);
        matches!(self.cursor, Cursor::At(_))
    }

    fn is_ended(&self) -> bool {
        self.cursor == Cursor::Ended
    }

    fn reset(&mut self) {
        self.cursor = Cursor::Before;
    }

    fn data_spec(&self) -> ChunkResult<DataSpec> {
        self.location.resolve(self.current()?)
    }

    fn chunk_start_time(&self) -> ChunkResult<Duration> {
        Ok(self.current()?.start)
    }

    fn chunk_end_time(&self) -> ChunkResult<Duration> {
        Ok(self.current()?.end())
    }
}

/// Iterator over an explicit list of descriptors.
#[derive(Clone, Debug)]
pub struct ChunkListIterator {
    chunks: Vec<ChunkDescriptor>,
    cursor: Cursor,
}

impl ChunkListIterator {
    pub fn new(chunks: Vec<ChunkDescriptor>) -> Self {
        Self {
            chunks,
            cursor: Cursor::Before,
        }
    }

    /// Descriptor under the cursor.
    pub fn current(&self) -> ChunkResult<&ChunkDescriptor> {
        let index = self.cursor.index()?;
        self.chunks.get(index).ok_or(ChunkError::NoSuchElement)
    }
}

impl ChunkIterator for ChunkListIterator {
    fn next(&mut self) -> bool {
        self.cursor = self.cursor.advance(&(0..self.chunks.len()));
        matches!(self.cursor, Cursor::At(_))
    }

    fn is_ended(&self) -> bool {
        self.cursor == Cursor::Ended
    }

    fn reset(&mut self) {
        self.cursor = Cursor::Before;
    }

    fn data_spec(&self) -> ChunkResult<DataSpec> {
        Ok(self.current()?.data_spec.clone())
    }

    fn chunk_start_time(&self) -> ChunkResult<Duration> {
        Ok(self.current()?.start)
    }

    fn chunk_end_time(&self) -> ChunkResult<Duration> {
        Ok(self.current()?.end)
    }
}

#[cfg(test)]
mod tests {
    use cadenza_net::RangeSpec;
    use rstest::rstest;
    use url::Url;

    use super::*;
    use crate::timeline::Segment;

    fn location() -> BaseLocation {
        BaseLocation::new(Url::parse("https://cdn.test/v/").unwrap(), 0)
    }

    fn timeline() -> Arc<SegmentTimeline> {
        let segments = (0..4u32)
            .map(|i| {
                Segment::new(
                    format!("seg-{i}.m4s"),
                    Duration::from_secs(2) * i,
                    Duration::from_secs(2),
                )
                .with_range(RangeSpec::from_offset_len(0, 250_000).unwrap())
            })
            .collect();
        Arc::new(SegmentTimeline::new(segments).unwrap())
    }

    fn assert_no_element(it: &dyn ChunkIterator) {
        assert_eq!(it.data_spec(), Err(ChunkError::NoSuchElement));
        assert_eq!(it.chunk_start_time(), Err(ChunkError::NoSuchElement));
        assert_eq!(it.chunk_end_time(), Err(ChunkError::NoSuchElement));
    }

    #[test]
    fn empty_iterator_never_advances() {
        let mut it = EmptyChunkIterator::INSTANCE;
        assert!(it.is_ended());
        for _ in 0..3 {
            assert!(!it.next());
            assert_no_element(&it);
        }
        it.reset();
        assert!(it.is_ended());
    }

    #[rstest]
    #[case(0..4, 4)]
    #[case(1..3, 2)]
    #[case(2..10, 2)]
    fn segment_iterator_walks_range(#[case] range: Range<usize>, #[case] expected: usize) {
        let mut it = SegmentChunkIterator::new(timeline(), location(), range);
        assert!(!it.is_ended());
        assert_no_element(&it);

        let mut starts = Vec::new();
        while it.next() {
            starts.push(it.chunk_start_time().unwrap());
            assert!(it.chunk_end_time().unwrap() > *starts.last().unwrap());
        }
        assert_eq!(starts.len(), expected);
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
        assert!(it.is_ended());
        assert_no_element(&it);
        assert!(!it.next());
    }

    #[test]
    fn reset_rewinds_to_before_first() {
        let mut it = SegmentChunkIterator::new(timeline(), location(), 1..3);
        while it.next() {}
        it.reset();
        assert!(!it.is_ended());
        assert_no_element(&it);
        assert!(it.next());
        assert_eq!(it.current_index(), Some(1));
        assert_eq!(
            it.data_spec().unwrap().url.as_str(),
            "https://cdn.test/v/seg-1.m4s"
        );
    }

    #[test]
    fn bitrate_from_next_chunk() {
        let mut it =
            SegmentChunkIterator::starting_at(timeline(), location(), Duration::from_secs(3));
        assert_eq!(it.chunk_bitrate(), Err(ChunkError::NoSuchElement));
        assert!(it.next());
        assert_eq!(it.chunk_start_time(), Ok(Duration::from_secs(2)));
        assert_eq!(it.chunk_bitrate(), Ok(Some(1_000_000)));
    }

    #[test]
    fn starting_past_end_is_empty() {
        let mut it =
            SegmentChunkIterator::starting_at(timeline(), location(), Duration::from_secs(60));
        assert!(!it.next());
        assert!(it.is_ended());
    }

    #[test]
    fn list_iterator_follows_contract() {
        let mut it = ChunkListIterator::new(Vec::new());
        assert!(!it.is_ended());
        assert!(!it.next());
        assert!(it.is_ended());
        assert_no_element(&it);
    }
}
