use std::{ops::Range, time::Duration};

use cadenza_net::RangeSpec;

use crate::error::{ChunkError, ChunkResult};

/// One addressable media segment.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// Path relative to a [`BaseLocation`](crate::BaseLocation).
    pub uri: String,
    pub start: Duration,
    pub duration: Duration,
    pub range: Option<RangeSpec>,
}

impl Segment {
    pub fn new<S: Into<String>>(uri: S, start: Duration, duration: Duration) -> Self {
        Self {
            uri: uri.into(),
            start,
            duration,
            range: None,
        }
    }

    pub fn with_range(mut self, range: RangeSpec) -> Self {
        self.range = Some(range);
        self
    }

    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    /// Declared length in bytes, when the segment is a bounded byte range.
    pub fn byte_length(&self) -> Option<u64> {
        self.range.and_then(|r| r.len())
    }
}

/// Ordered, gap-free list of segments for one format.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentTimeline {
    init: Option<Segment>,
    segments: Vec<Segment>,
    live: bool,
}

impl SegmentTimeline {
    /// # Errors
    ///
    /// Returns [`ChunkError::Discontinuity`] when a segment does not start
    /// where the previous one ends.
    pub fn new(segments: Vec<Segment>) -> ChunkResult<Self> {
        for (index, pair) in segments.windows(2).enumerate() {
            let expected = pair[0].end();
            if pair[1].start != expected {
                return Err(ChunkError::Discontinuity {
                    index: index + 1,
                    expected,
                    actual: pair[1].start,
                });
            }
        }
        Ok(Self {
            init: None,
            segments,
            live: false,
        })
    }

    /// Build `count` back-to-back segments of equal duration from a URI
    /// template; `$Number$` is replaced by the segment number.
    pub fn uniform(template: &str, count: usize, duration: Duration) -> Self {
        let segments = (0..count)
            .map(|n| {
                let start = duration * u32::try_from(n).unwrap_or(u32::MAX);
                Segment::new(template.replace("$Number$", &n.to_string()), start, duration)
            })
            .collect();
        Self {
            init: None,
            segments,
            live: false,
        }
    }

    pub fn with_init_segment(mut self, init: Segment) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn init_segment(&self) -> Option<&Segment> {
        self.init.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn start(&self) -> Duration {
        self.segments.first().map_or(Duration::ZERO, |s| s.start)
    }

    pub fn end(&self) -> Duration {
        self.segments.last().map_or(Duration::ZERO, Segment::end)
    }

    pub fn duration(&self) -> Duration {
        self.end() - self.start()
    }

    /// Index of the segment containing `time`.
    pub fn segment_index_at(&self, time: Duration) -> Option<usize> {
        let index = self.segments.partition_point(|s| s.end() <= time);
        self.segments
            .get(index)
            .filter(|s| s.start <= time)
            .map(|_| index)
    }

    /// Indices of the segments overlapping `[start, end)`.
    pub fn chunks_in_window(&self, start: Duration, end: Duration) -> Range<usize> {
        if end <= start {
            return 0..0;
        }
        let from = self.segments.partition_point(|s| s.end() <= start);
        let to = self.segments.partition_point(|s| s.start < end);
        from..to.max(from)
    }
}
