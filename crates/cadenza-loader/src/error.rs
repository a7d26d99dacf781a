use std::time::Duration;

use cadenza_abr::AbrError;
use cadenza_alloc::AllocError;
use cadenza_chunk::ChunkError;
use cadenza_policy::LoadErrorInfo;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("a load is already in progress")]
    Busy,
    #[error("no active load")]
    NoActiveLoad,
    #[error("load failed after {} attempt(s): {}", .0.error_count, .0.error)]
    Fatal(Box<LoadErrorInfo>),
    #[error("chunk starting at {actual:?} queued after one starting at {expected:?}")]
    OutOfOrder { expected: Duration, actual: Duration },
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Abr(#[from] AbrError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

impl LoaderError {
    /// The failure that ended the stream, if this is one.
    pub fn fatal_info(&self) -> Option<&LoadErrorInfo> {
        match self {
            LoaderError::Fatal(info) => Some(info),
            _ => None,
        }
    }
}

pub type LoaderResult<T> = Result<T, LoaderError>;
