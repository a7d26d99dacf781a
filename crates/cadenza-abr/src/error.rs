use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbrError {
    #[error("track selection already enabled")]
    AlreadyEnabled,
    #[error("track selection not enabled")]
    NotEnabled,
    #[error("expected {expected} chunk iterators, got {actual}")]
    IteratorCountMismatch { expected: usize, actual: usize },
    #[error("track selection needs at least one track")]
    EmptySelection,
    #[error("track index {index} out of range (len {len})")]
    TrackIndexOutOfRange { index: usize, len: usize },
}

pub type AbrResult<T> = Result<T, AbrError>;
