//! Load-error handling policy.
//!
//! Given a failed load and its history, a [`LoadErrorHandlingPolicy`] decides
//! whether to retry after a delay, fall back to another location or track,
//! or give up.

#![forbid(unsafe_code)]

mod default;
mod error;
mod fallback;
mod options;
mod policy;

pub use crate::{
    default::{DefaultLoadErrorHandlingPolicy, TaskErrorStats},
    error::{LoadError, LoadErrorInfo},
    fallback::{FallbackOptions, FallbackSelection, FallbackType},
    options::{LoadErrorOptions, RetryBackoff},
    policy::LoadErrorHandlingPolicy,
};

#[cfg(any(test, feature = "test-utils"))]
pub use crate::policy::LoadErrorHandlingPolicyMock;
