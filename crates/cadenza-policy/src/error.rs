use cadenza_chunk::{ExtractorError, LoadEventInfo, MediaLoadData};
use cadenza_net::NetError;
use thiserror::Error;

/// Why one load attempt failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Extractor(#[from] ExtractorError),
    #[error("loaded {actual} bytes, expected {expected}")]
    LengthMismatch { expected: u64, actual: u64 },
    #[error("unexpected loader failure: {0}")]
    Unexpected(String),
}

impl LoadError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            LoadError::Net(e) => e.status_code(),
            _ => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, LoadError::Net(NetError::Cancelled))
    }

    /// Parse and format failures of the loaded data.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, LoadError::Extractor(_) | LoadError::LengthMismatch { .. })
    }
}

/// Everything known about one failure, handed to the policy.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadErrorInfo {
    pub load_event_info: LoadEventInfo,
    pub media_load_data: MediaLoadData,
    pub error: LoadError,
    /// Successive failures of this load task, including this one.
    pub error_count: u32,
}

impl LoadErrorInfo {
    pub fn new(
        load_event_info: LoadEventInfo,
        media_load_data: MediaLoadData,
        error: LoadError,
        error_count: u32,
    ) -> Self {
        Self {
            load_event_info,
            media_load_data,
            error,
            error_count,
        }
    }
}
