use std::time::{Duration, Instant};

use cadenza_chunk::BaseLocation;
use tracing::debug;

/// Base locations with per-location exclusion deadlines.
///
/// Locations are kept in priority order; [`select`](Self::select) returns the
/// most preferred one that is not excluded.
#[derive(Clone, Debug)]
pub struct LocationExclusionList {
    locations: Vec<BaseLocation>,
    excluded_until: Vec<Option<Instant>>,
}

impl LocationExclusionList {
    pub fn new(mut locations: Vec<BaseLocation>) -> Self {
        locations.sort_by_key(|l| l.priority);
        Self {
            excluded_until: vec![None; locations.len()],
            locations,
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn location(&self, index: usize) -> Option<&BaseLocation> {
        self.locations.get(index)
    }

    pub fn is_excluded(&self, index: usize, now: Instant) -> bool {
        self.excluded_until
            .get(index)
            .copied()
            .flatten()
            .is_some_and(|until| until > now)
    }

    pub fn excluded_count(&self, now: Instant) -> usize {
        (0..self.len()).filter(|i| self.is_excluded(*i, now)).count()
    }

    /// Preferred available location. When every location is excluded, the
    /// one whose exclusion ends first. `None` only for an empty list.
    pub fn select(&self, now: Instant) -> Option<usize> {
        (0..self.len())
            .find(|i| !self.is_excluded(*i, now))
            .or_else(|| {
                (0..self.len()).min_by_key(|i| self.excluded_until[*i].unwrap_or(now))
            })
    }

    /// Returns `false` for an unknown index.
    pub fn exclude(&mut self, index: usize, duration: Duration, now: Instant) -> bool {
        let Some(slot) = self.excluded_until.get_mut(index) else {
            return false;
        };
        let until = now + duration;
        *slot = Some(slot.map_or(until, |prev| prev.max(until)));
        debug!(
            index,
            url = %self.locations[index].url,
            ?duration,
            "location excluded"
        );
        true
    }

    pub fn reset(&mut self) {
        self.excluded_until.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn list() -> LocationExclusionList {
        LocationExclusionList::new(vec![
            BaseLocation::new(Url::parse("https://backup.test/").unwrap(), 2),
            BaseLocation::new(Url::parse("https://primary.test/").unwrap(), 1),
        ])
    }

    #[test]
    fn prefers_lowest_priority_value() {
        let list = list();
        let now = Instant::now();
        let index = list.select(now).unwrap();
        assert_eq!(list.location(index).unwrap().url.host_str(), Some("primary.test"));
    }

    #[test]
    fn excluded_location_is_skipped_until_expiry() {
        let mut list = list();
        let now = Instant::now();
        assert!(list.exclude(0, Duration::from_secs(300), now));
        assert_eq!(list.select(now), Some(1));
        assert_eq!(list.excluded_count(now), 1);
        assert_eq!(list.select(now + Duration::from_secs(300)), Some(0));
    }

    #[test]
    fn all_excluded_picks_earliest_expiry() {
        let mut list = list();
        let now = Instant::now();
        list.exclude(0, Duration::from_secs(60), now);
        list.exclude(1, Duration::from_secs(10), now);
        assert_eq!(list.select(now), Some(1));

        list.reset();
        assert_eq!(list.excluded_count(now), 0);
    }

    #[test]
    fn unknown_index_is_ignored() {
        let mut list = list();
        assert!(!list.exclude(5, Duration::from_secs(1), Instant::now()));
        assert!(LocationExclusionList::new(Vec::new()).select(Instant::now()).is_none());
    }
}
