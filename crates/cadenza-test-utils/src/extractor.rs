//! Pass-through extractors that record what the loader feeds them.

use std::{sync::Arc, time::Duration};

use cadenza_chunk::{
    ChunkExtractor, ChunkIndex, ExtractorError, ExtractorFactory, Format, TrackOutput,
    TrackOutputProvider, TrackType,
};
use parking_lot::Mutex;

#[derive(Default)]
struct Recorded {
    tracks: Vec<(u32, TrackType)>,
    formats: Vec<Arc<Format>>,
    data: Vec<u8>,
    samples: usize,
    ended: bool,
}

/// Track output collecting every byte and format it receives.
#[derive(Default)]
pub struct RecordingOutput {
    recorded: Mutex<Recorded>,
}

impl RecordingOutput {
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.recorded.lock().data.clone()
    }

    #[must_use]
    pub fn formats(&self) -> Vec<Arc<Format>> {
        self.recorded.lock().formats.clone()
    }

    #[must_use]
    pub fn track_count(&self) -> usize {
        self.recorded.lock().tracks.len()
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.recorded.lock().samples
    }

    #[must_use]
    pub fn tracks_ended(&self) -> bool {
        self.recorded.lock().ended
    }
}

impl TrackOutput for RecordingOutput {
    fn format(&self, format: Arc<Format>) {
        self.recorded.lock().formats.push(format);
    }

    fn sample_data(&self, data: &[u8]) {
        self.recorded.lock().data.extend_from_slice(data);
    }

    fn sample_metadata(&self, _time: Duration, _is_key_frame: bool, _size: usize) {
        self.recorded.lock().samples += 1;
    }
}

/// Provider handing out one shared [`RecordingOutput`] for every track.
#[derive(Clone, Default)]
pub struct RecordingProvider {
    output: Arc<RecordingOutput>,
}

impl TrackOutputProvider for RecordingProvider {
    fn track(&self, id: u32, track_type: TrackType) -> Arc<dyn TrackOutput> {
        self.output.recorded.lock().tracks.push((id, track_type));
        Arc::clone(&self.output) as Arc<dyn TrackOutput>
    }

    fn end_tracks(&self) {
        self.output.recorded.lock().ended = true;
    }
}

struct PassThroughExtractor {
    format: Arc<Format>,
    output: Option<Arc<dyn TrackOutput>>,
    fail_after: Option<usize>,
    seen: usize,
    start: Duration,
}

impl ChunkExtractor for PassThroughExtractor {
    fn init(
        &mut self,
        provider: Arc<dyn TrackOutputProvider>,
        start: Option<Duration>,
        _end: Option<Duration>,
    ) -> Result<(), ExtractorError> {
        let output = provider.track(0, self.format.track_type);
        output.format(Arc::clone(&self.format));
        provider.end_tracks();
        self.output = Some(output);
        self.start = start.unwrap_or_default();
        Ok(())
    }

    fn read(&mut self, input: &[u8]) -> Result<bool, ExtractorError> {
        let output = self.output.as_ref().ok_or(ExtractorError::NotInitialized)?;
        self.seen += input.len();
        if let Some(limit) = self.fail_after
            && self.seen >= limit
        {
            return Err(ExtractorError::Malformed(format!(
                "bad box header after {limit} bytes"
            )));
        }
        output.sample_data(input);
        output.sample_metadata(self.start, true, input.len());
        Ok(true)
    }

    fn sample_formats(&self) -> Option<Vec<Arc<Format>>> {
        self.output.as_ref().map(|_| vec![Arc::clone(&self.format)])
    }

    fn chunk_index(&self) -> Option<ChunkIndex> {
        None
    }
}

/// Creates extractors that forward every byte to a [`RecordingOutput`].
#[derive(Clone, Default)]
pub struct RecordingExtractorFactory {
    provider: RecordingProvider,
}

impl RecordingExtractorFactory {
    #[must_use]
    pub fn recorded(&self) -> Arc<RecordingOutput> {
        Arc::clone(&self.provider.output)
    }
}

impl ExtractorFactory for RecordingExtractorFactory {
    fn create(&self, format: &Format) -> Option<Box<dyn ChunkExtractor>> {
        Some(Box::new(PassThroughExtractor {
            format: Arc::new(format.clone()),
            output: None,
            fail_after: None,
            seen: 0,
            start: Duration::ZERO,
        }))
    }

    fn output(&self) -> Arc<dyn TrackOutputProvider> {
        Arc::new(self.provider.clone())
    }
}

/// Creates extractors that reject the chunk once `after` bytes were read.
#[derive(Clone, Default)]
pub struct FailingExtractorFactory {
    after: usize,
    provider: RecordingProvider,
}

impl FailingExtractorFactory {
    #[must_use]
    pub fn new(after: usize) -> Self {
        Self {
            after,
            provider: RecordingProvider::default(),
        }
    }
}

impl ExtractorFactory for FailingExtractorFactory {
    fn create(&self, format: &Format) -> Option<Box<dyn ChunkExtractor>> {
        Some(Box::new(PassThroughExtractor {
            format: Arc::new(format.clone()),
            output: None,
            fail_after: Some(self.after),
            seen: 0,
            start: Duration::ZERO,
        }))
    }

    fn output(&self) -> Arc<dyn TrackOutputProvider> {
        Arc::new(self.provider.clone())
    }
}
