use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChunkError {
    #[error("no such element")]
    NoSuchElement,
    #[error("track group has no formats")]
    EmptyTrackGroup,
    #[error("segment {index} starts at {actual:?}, expected {expected:?}")]
    Discontinuity {
        index: usize,
        expected: Duration,
        actual: Duration,
    },
    #[error("track index {index} out of range (len {len})")]
    TrackIndexOutOfRange { index: usize, len: usize },
    #[error("no base locations")]
    NoLocations,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

pub type ChunkResult<T> = Result<T, ChunkError>;

/// Failure reported by a [`ChunkExtractor`](crate::ChunkExtractor).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractorError {
    #[error("malformed container data: {0}")]
    Malformed(String),
    #[error("unsupported container: {0}")]
    Unsupported(String),
    #[error("extractor not initialized")]
    NotInitialized,
}
