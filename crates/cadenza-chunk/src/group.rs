use std::sync::Arc;

use crate::{
    error::{ChunkError, ChunkResult},
    format::{Format, TrackType},
};

/// Immutable set of alternative formats of the same content.
#[derive(Clone, Debug)]
pub struct TrackGroup {
    id: String,
    formats: Vec<Arc<Format>>,
}

impl TrackGroup {
    /// # Errors
    ///
    /// Returns [`ChunkError::EmptyTrackGroup`] for an empty format list.
    pub fn new<S: Into<String>>(id: S, formats: Vec<Arc<Format>>) -> ChunkResult<Self> {
        if formats.is_empty() {
            return Err(ChunkError::EmptyTrackGroup);
        }
        Ok(Self {
            id: id.into(),
            formats,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Always `false`: construction rejects empty groups.
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn format(&self, index: usize) -> ChunkResult<&Arc<Format>> {
        self.formats
            .get(index)
            .ok_or(ChunkError::TrackIndexOutOfRange {
                index,
                len: self.formats.len(),
            })
    }

    pub fn formats(&self) -> &[Arc<Format>] {
        &self.formats
    }

    /// Index of `format` in this group, by identity.
    pub fn index_of(&self, format: &Arc<Format>) -> Option<usize> {
        self.formats.iter().position(|f| Arc::ptr_eq(f, format))
    }

    pub fn track_type(&self) -> TrackType {
        self.formats
            .first()
            .map_or(TrackType::Unknown, |f| f.track_type)
    }
}
