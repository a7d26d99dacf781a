use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use cadenza_net::DataSpec;

use crate::{
    chunk::ChunkDescriptor,
    format::{DataType, Format, SelectionReason, TrackType},
};

/// Opaque identity of one load task, stable across its retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTaskId(u64);

impl LoadTaskId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Hands out [`LoadTaskId`]s. Clones share one counter, so every loader
/// fed from the same source gets distinct ids.
#[derive(Clone, Debug, Default)]
pub struct LoadTaskIds(Arc<AtomicU64>);

impl LoadTaskIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> LoadTaskId {
        LoadTaskId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Transfer-level facts about one load attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadEventInfo {
    pub task_id: LoadTaskId,
    pub data_spec: DataSpec,
    pub started_at: Instant,
    pub elapsed: Duration,
    pub bytes_loaded: u64,
}

impl LoadEventInfo {
    pub fn new(task_id: LoadTaskId, data_spec: DataSpec, started_at: Instant) -> Self {
        Self {
            task_id,
            data_spec,
            started_at,
            elapsed: Duration::ZERO,
            bytes_loaded: 0,
        }
    }

    pub fn with_progress(mut self, elapsed: Duration, bytes_loaded: u64) -> Self {
        self.elapsed = elapsed;
        self.bytes_loaded = bytes_loaded;
        self
    }
}

/// Media-level facts about what a load fetches.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaLoadData {
    pub data_type: DataType,
    pub track_type: TrackType,
    pub format: Option<Arc<Format>>,
    pub selection_reason: SelectionReason,
    pub media_start: Option<Duration>,
    pub media_end: Option<Duration>,
}

impl MediaLoadData {
    pub fn new(data_type: DataType, track_type: TrackType) -> Self {
        Self {
            data_type,
            track_type,
            format: None,
            selection_reason: SelectionReason::Unknown,
            media_start: None,
            media_end: None,
        }
    }
}

impl From<&ChunkDescriptor> for MediaLoadData {
    fn from(chunk: &ChunkDescriptor) -> Self {
        Self {
            data_type: chunk.data_type,
            track_type: chunk.format.track_type,
            format: Some(Arc::clone(&chunk.format)),
            selection_reason: chunk.selection_reason,
            media_start: Some(chunk.start),
            media_end: Some(chunk.end),
        }
    }
}
