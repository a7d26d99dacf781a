use std::time::Duration;

use tracing::trace;

/// Decides whether the pipeline should start another load.
pub trait LoadControl: Send {
    /// `buffered` is media ahead of the playback position;
    /// `bytes_allocated` is what the allocation pool currently has out.
    fn should_continue_loading(
        &mut self,
        buffered: Duration,
        playback_speed: f32,
        bytes_allocated: usize,
    ) -> bool;

    fn reset(&mut self) {}
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoadControlOptions {
    /// Always load below this much buffered media.
    pub min_buffer: Duration,
    /// Never load above this much buffered media.
    pub max_buffer: Duration,
    /// Stop loading once the pool has this many bytes out. `None` disables
    /// the byte limit.
    pub target_buffer_bytes: Option<usize>,
}

impl Default for LoadControlOptions {
    fn default() -> Self {
        Self {
            min_buffer: Duration::from_secs(15),
            max_buffer: Duration::from_secs(30),
            target_buffer_bytes: Some(200 * 64 * 1024),
        }
    }
}

impl LoadControlOptions {
    pub fn with_min_buffer(mut self, min_buffer: Duration) -> Self {
        self.min_buffer = min_buffer;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: Duration) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    pub fn with_target_buffer_bytes(mut self, bytes: Option<usize>) -> Self {
        self.target_buffer_bytes = bytes;
        self
    }
}

/// Buffer-duration watermarks with a byte ceiling.
///
/// Between the watermarks the previous decision holds, so loading runs in
/// bursts from `min_buffer` up to `max_buffer`.
#[derive(Clone, Debug, Default)]
pub struct DefaultLoadControl {
    options: LoadControlOptions,
    loading: bool,
}

impl DefaultLoadControl {
    pub fn new(options: LoadControlOptions) -> Self {
        Self {
            options,
            loading: false,
        }
    }

    pub fn options(&self) -> &LoadControlOptions {
        &self.options
    }
}

impl LoadControl for DefaultLoadControl {
    fn should_continue_loading(
        &mut self,
        buffered: Duration,
        playback_speed: f32,
        bytes_allocated: usize,
    ) -> bool {
        let over_target = self
            .options
            .target_buffer_bytes
            .is_some_and(|target| bytes_allocated >= target);
        let min_buffer = if playback_speed > 1.0 {
            self.options
                .min_buffer
                .mul_f32(playback_speed)
                .min(self.options.max_buffer)
        } else {
            self.options.min_buffer
        };

        self.loading = if over_target {
            false
        } else if buffered < min_buffer {
            true
        } else if buffered >= self.options.max_buffer {
            false
        } else {
            self.loading
        };
        trace!(?buffered, bytes_allocated, loading = self.loading, "load control decision");
        self.loading
    }

    fn reset(&mut self) {
        self.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const S: Duration = Duration::from_secs(1);

    #[rstest]
    #[case(5, 0, true)]
    #[case(35, 0, false)]
    #[case(5, 200 * 64 * 1024, false)]
    fn watermarks(#[case] buffered_secs: u32, #[case] bytes: usize, #[case] expected: bool) {
        let mut control = DefaultLoadControl::default();
        assert_eq!(control.should_continue_loading(S * buffered_secs, 1.0, bytes), expected);
    }

    #[test]
    fn hysteresis_between_watermarks() {
        let mut control = DefaultLoadControl::default();
        assert!(!control.should_continue_loading(S * 20, 1.0, 0));
        assert!(control.should_continue_loading(S * 10, 1.0, 0));
        assert!(control.should_continue_loading(S * 20, 1.0, 0));
        assert!(!control.should_continue_loading(S * 30, 1.0, 0));
        assert!(!control.should_continue_loading(S * 20, 1.0, 0));
    }

    #[test]
    fn faster_playback_raises_min_buffer() {
        let mut control = DefaultLoadControl::default();
        assert!(control.should_continue_loading(S * 20, 1.5, 0));
    }

    #[test]
    fn byte_limit_can_be_disabled() {
        let mut control =
            DefaultLoadControl::new(LoadControlOptions::default().with_target_buffer_bytes(None));
        assert!(control.should_continue_loading(S, 1.0, usize::MAX));
    }
}
