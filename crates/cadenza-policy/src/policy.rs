use std::time::Duration;

use cadenza_chunk::{DataType, LoadTaskId};

use crate::{
    error::LoadErrorInfo,
    fallback::{FallbackOptions, FallbackSelection},
};

/// Decides what happens after a failed load.
///
/// Called from the control context only. Implementations may keep
/// statistics per load task; [`on_load_task_concluded`](Self::on_load_task_concluded)
/// marks the end of a task so they can be dropped.
#[cfg_attr(
    any(test, feature = "test-utils"),
    unimock::unimock(api = LoadErrorHandlingPolicyMock)
)]
pub trait LoadErrorHandlingPolicy: Send + Sync {
    /// A fallback to apply, or `None`. A returned type must be available in
    /// `options`.
    fn fallback_selection_for(
        &self,
        options: &FallbackOptions,
        info: &LoadErrorInfo,
    ) -> Option<FallbackSelection>;

    /// Delay before retrying, or `None` if the error is fatal.
    fn retry_delay_for(&self, info: &LoadErrorInfo) -> Option<Duration>;

    /// Retries granted before the loader declares the task failed.
    fn minimum_loadable_retry_count(&self, data_type: DataType) -> u32;

    fn on_load_task_concluded(&self, task_id: LoadTaskId);
}
