use std::{collections::HashMap, time::Duration};

use cadenza_chunk::{DataType, LoadTaskId};
use cadenza_net::NetError;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    error::{LoadError, LoadErrorInfo},
    fallback::{FallbackOptions, FallbackSelection, FallbackType},
    options::LoadErrorOptions,
    policy::LoadErrorHandlingPolicy,
};

/// HTTP statuses that indicate a broken resource at one origin.
const FALLBACK_STATUSES: [u16; 6] = [403, 404, 410, 416, 500, 503];

/// Failure statistics of one load task.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskErrorStats {
    pub failures: u32,
    pub last_status: Option<u16>,
}

/// Backoff-based policy with location-then-track fallback.
#[derive(Debug, Default)]
pub struct DefaultLoadErrorHandlingPolicy {
    options: LoadErrorOptions,
    stats: Mutex<HashMap<LoadTaskId, TaskErrorStats>>,
}

impl DefaultLoadErrorHandlingPolicy {
    pub fn new(options: LoadErrorOptions) -> Self {
        Self {
            options,
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &LoadErrorOptions {
        &self.options
    }

    pub fn task_stats(&self, task_id: LoadTaskId) -> Option<TaskErrorStats> {
        self.stats.lock().get(&task_id).cloned()
    }

    pub fn tracked_tasks(&self) -> usize {
        self.stats.lock().len()
    }

    fn is_retryable(error: &LoadError) -> bool {
        match error {
            LoadError::Net(NetError::Cancelled) => false,
            LoadError::Net(e) => !e.is_resource_specific(),
            LoadError::Extractor(_)
            | LoadError::LengthMismatch { .. }
            | LoadError::Unexpected(_) => {
                false
            }
        }
    }

    fn eligible_fallbacks(error: &LoadError) -> &'static [FallbackType] {
        match error {
            LoadError::Net(NetError::HttpError { status, .. })
                if FALLBACK_STATUSES.contains(status) =>
            {
                &[FallbackType::Location, FallbackType::Track]
            }
            LoadError::Extractor(_) | LoadError::LengthMismatch { .. } => &[FallbackType::Track],
            _ => &[],
        }
    }

    fn exclusion_for(&self, fallback_type: FallbackType) -> Duration {
        match fallback_type {
            FallbackType::Location => self.options.location_exclusion,
            FallbackType::Track => self.options.track_exclusion,
        }
    }
}

impl LoadErrorHandlingPolicy for DefaultLoadErrorHandlingPolicy {
    fn fallback_selection_for(
        &self,
        options: &FallbackOptions,
        info: &LoadErrorInfo,
    ) -> Option<FallbackSelection> {
        let selection = Self::eligible_fallbacks(&info.error)
            .iter()
            .copied()
            .find(|t| options.is_fallback_available(*t))
            .map(|t| FallbackSelection::new(t, self.exclusion_for(t)));
        debug!(
            task = info.load_event_info.task_id.get(),
            error = %info.error,
            ?selection,
            "fallback decision"
        );
        selection
    }

    fn retry_delay_for(&self, info: &LoadErrorInfo) -> Option<Duration> {
        {
            let mut stats = self.stats.lock();
            let entry = stats.entry(info.load_event_info.task_id).or_default();
            entry.failures = entry.failures.max(info.error_count);
            entry.last_status = info.error.status_code();
        }

        let delay = Self::is_retryable(&info.error)
            .then(|| self.options.backoff.delay_for_attempt(info.error_count));
        debug!(
            task = info.load_event_info.task_id.get(),
            error_count = info.error_count,
            ?delay,
            "retry decision"
        );
        delay
    }

    fn minimum_loadable_retry_count(&self, data_type: DataType) -> u32 {
        match data_type {
            DataType::Media => self
                .options
                .media_min_retry_count
                .unwrap_or(self.options.default_min_retry_count),
            _ => self.options.default_min_retry_count,
        }
    }

    fn on_load_task_concluded(&self, task_id: LoadTaskId) {
        self.stats.lock().remove(&task_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use cadenza_chunk::{ExtractorError, LoadEventInfo, MediaLoadData, TrackType};
    use cadenza_net::DataSpec;
    use rstest::rstest;
    use url::Url;

    use super::*;

    fn url() -> Url {
        Url::parse("https://cdn.test/v/seg-1.m4s").unwrap()
    }

    fn info(error: LoadError, error_count: u32) -> LoadErrorInfo {
        LoadErrorInfo::new(
            LoadEventInfo::new(LoadTaskId::new(7), DataSpec::new(url()), Instant::now()),
            MediaLoadData::new(DataType::Media, TrackType::Video),
            error,
            error_count,
        )
    }

    fn status(code: u16) -> LoadError {
        LoadError::Net(NetError::http_status(url(), code))
    }

    #[rstest]
    #[case::timeout(LoadError::Net(NetError::Timeout), Some(Duration::from_secs(2)))]
    #[case::server(status(503), Some(Duration::from_secs(2)))]
    #[case::reset(LoadError::Net(NetError::http("connection reset")), Some(Duration::from_secs(2)))]
    #[case::not_found(status(404), None)]
    #[case::parse(LoadError::Extractor(ExtractorError::Malformed("moof".into())), None)]
    #[case::cancelled(LoadError::Net(NetError::Cancelled), None)]
    #[case::length(LoadError::LengthMismatch { expected: 10, actual: 4 }, None)]
    #[case::unexpected(LoadError::Unexpected("worker panicked".into()), None)]
    fn retry_classification(#[case] error: LoadError, #[case] expected: Option<Duration>) {
        let policy = DefaultLoadErrorHandlingPolicy::default();
        assert_eq!(policy.retry_delay_for(&info(error, 2)), expected);
    }

    #[rstest]
    #[case(status(404), FallbackOptions::new(2, 0, 2, 0), Some(FallbackType::Location))]
    #[case(status(404), FallbackOptions::new(2, 1, 2, 0), Some(FallbackType::Track))]
    #[case(status(404), FallbackOptions::new(1, 0, 1, 0), None)]
    #[case(status(500), FallbackOptions::new(3, 0, 1, 0), Some(FallbackType::Location))]
    #[case(status(502), FallbackOptions::new(3, 0, 3, 0), None)]
    #[case(LoadError::Net(NetError::Timeout), FallbackOptions::new(3, 0, 3, 0), None)]
    #[case(
        LoadError::Extractor(ExtractorError::Malformed("bad box".into())),
        FallbackOptions::new(3, 0, 3, 0),
        Some(FallbackType::Track)
    )]
    fn fallback_selection(
        #[case] error: LoadError,
        #[case] options: FallbackOptions,
        #[case] expected: Option<FallbackType>,
    ) {
        let policy = DefaultLoadErrorHandlingPolicy::default();
        let selection = policy.fallback_selection_for(&options, &info(error, 1));
        assert_eq!(selection.map(|s| s.fallback_type), expected);
        if let Some(s) = selection {
            assert!(options.is_fallback_available(s.fallback_type));
        }
    }

    #[test]
    fn exclusion_durations_follow_type() {
        let policy = DefaultLoadErrorHandlingPolicy::default();
        let location = policy
            .fallback_selection_for(&FallbackOptions::new(2, 0, 2, 0), &info(status(410), 1))
            .unwrap();
        assert_eq!(location.exclusion_duration, Duration::from_secs(300));

        let track = policy
            .fallback_selection_for(&FallbackOptions::new(1, 0, 2, 0), &info(status(410), 1))
            .unwrap();
        assert_eq!(track.exclusion_duration, Duration::from_secs(60));
    }

    #[test]
    fn min_retry_count_by_data_type() {
        let policy = DefaultLoadErrorHandlingPolicy::new(
            LoadErrorOptions::default().with_media_min_retry_count(6),
        );
        assert_eq!(policy.minimum_loadable_retry_count(DataType::Media), 6);
        assert_eq!(policy.minimum_loadable_retry_count(DataType::Manifest), 3);
    }

    #[test]
    fn stats_are_dropped_when_task_concludes() {
        let policy = DefaultLoadErrorHandlingPolicy::default();
        policy.retry_delay_for(&info(status(503), 1));
        policy.retry_delay_for(&info(status(503), 2));
        assert_eq!(
            policy.task_stats(LoadTaskId::new(7)),
            Some(TaskErrorStats {
                failures: 2,
                last_status: Some(503)
            })
        );

        policy.on_load_task_concluded(LoadTaskId::new(7));
        assert_eq!(policy.tracked_tasks(), 0);
    }
}
