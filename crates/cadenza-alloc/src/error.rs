use thiserror::Error;

use crate::AllocationId;

/// Errors reported by the allocation pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("allocation pool exhausted at {limit_bytes} bytes")]
    Exhausted { limit_bytes: usize },
    #[error("allocation {id:?} was not issued by this pool")]
    ForeignAllocation { id: AllocationId },
    #[error("invalid allocation length: {0}")]
    InvalidLength(usize),
}

pub type AllocResult<T> = Result<T, AllocError>;
