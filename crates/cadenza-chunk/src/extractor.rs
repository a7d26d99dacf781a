use std::{sync::Arc, time::Duration};

use crate::{
    error::ExtractorError,
    format::{Format, TrackType},
};

/// Receives parsed samples for one elementary stream.
pub trait TrackOutput: Send + Sync {
    fn format(&self, format: Arc<Format>);

    fn sample_data(&self, data: &[u8]);

    fn sample_metadata(&self, time: Duration, is_key_frame: bool, size: usize);
}

/// Hands out a [`TrackOutput`] per track found in the container.
pub trait TrackOutputProvider: Send + Sync {
    fn track(&self, id: u32, track_type: TrackType) -> Arc<dyn TrackOutput>;

    /// No further tracks will be requested.
    fn end_tracks(&self) {}
}

/// Index of the sub-chunks found inside a container, when it carries one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkIndex {
    pub sizes: Vec<u32>,
    pub offsets: Vec<u64>,
    pub durations: Vec<Duration>,
    pub times: Vec<Duration>,
}

impl ChunkIndex {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Entry containing `time`.
    pub fn index_at(&self, time: Duration) -> Option<usize> {
        let index = self.times.partition_point(|t| *t <= time).checked_sub(1)?;
        let end = self.times[index] + self.durations.get(index).copied().unwrap_or_default();
        (time < end).then_some(index)
    }
}

/// Container demuxer fed with chunk bytes as they arrive.
///
/// Container grammars live outside this workspace; the loader only drives
/// the extractor and reports its failures.
pub trait ChunkExtractor: Send {
    fn init(
        &mut self,
        output: Arc<dyn TrackOutputProvider>,
        start: Option<Duration>,
        end: Option<Duration>,
    ) -> Result<(), ExtractorError>;

    /// Consume `input`. Returns whether the extractor wants more data.
    fn read(&mut self, input: &[u8]) -> Result<bool, ExtractorError>;

    /// Formats of the tracks found so far, once known.
    fn sample_formats(&self) -> Option<Vec<Arc<Format>>>;

    fn chunk_index(&self) -> Option<ChunkIndex>;
}

/// Creates an extractor for chunks of a given format.
pub trait ExtractorFactory: Send + Sync {
    /// `None` when the format needs no parsing.
    fn create(&self, format: &Format) -> Option<Box<dyn ChunkExtractor>>;

    fn output(&self) -> Arc<dyn TrackOutputProvider>;
}
