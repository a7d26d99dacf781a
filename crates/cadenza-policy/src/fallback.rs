use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FallbackType {
    /// Same track from another base location.
    Location,
    /// Another track of the same group.
    Track,
}

/// How many alternatives remain, as seen by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FallbackOptions {
    pub num_locations: usize,
    pub num_excluded_locations: usize,
    pub num_tracks: usize,
    pub num_excluded_tracks: usize,
}

impl FallbackOptions {
    pub fn new(
        num_locations: usize,
        num_excluded_locations: usize,
        num_tracks: usize,
        num_excluded_tracks: usize,
    ) -> Self {
        Self {
            num_locations,
            num_excluded_locations,
            num_tracks,
            num_excluded_tracks,
        }
    }

    /// A fallback is available when excluding one more candidate still
    /// leaves at least one.
    pub fn is_fallback_available(&self, fallback_type: FallbackType) -> bool {
        let (total, excluded) = match fallback_type {
            FallbackType::Location => (self.num_locations, self.num_excluded_locations),
            FallbackType::Track => (self.num_tracks, self.num_excluded_tracks),
        };
        total.saturating_sub(excluded) > 1
    }
}

/// Policy output: what to exclude and for how long.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FallbackSelection {
    pub fallback_type: FallbackType,
    pub exclusion_duration: Duration,
}

impl FallbackSelection {
    pub fn new(fallback_type: FallbackType, exclusion_duration: Duration) -> Self {
        Self {
            fallback_type,
            exclusion_duration,
        }
    }
}
