use std::{collections::HashMap, time::Duration};

use url::Url;

use crate::error::{NetError, NetResult};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<HashMap<String, String>> for Headers {
    fn from(map: HashMap<String, String>) -> Self {
        Self { inner: map }
    }
}

/// Inclusive byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Range covering `len` bytes from `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::InvalidRange`] for an empty or overflowing range.
    pub fn from_offset_len(offset: u64, len: u64) -> NetResult<Self> {
        let end = len
            .checked_sub(1)
            .and_then(|last| offset.checked_add(last))
            .ok_or_else(|| NetError::InvalidRange(format!("offset={offset} len={len}")))?;
        Ok(Self::new(offset, Some(end)))
    }

    /// Number of bytes covered, if bounded.
    pub fn len(&self) -> Option<u64> {
        self.end
            .and_then(|end| end.checked_sub(self.start))
            .map(|span| span + 1)
    }

    pub fn to_header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Description of one fetch: where, which bytes, and an optional cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DataSpec {
    pub url: Url,
    pub range: Option<RangeSpec>,
    pub key: Option<String>,
}

impl DataSpec {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            range: None,
            key: None,
        }
    }

    pub fn with_range(mut self, range: RangeSpec) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_key<S: Into<String>>(mut self, key: S) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Byte offset of the first requested byte.
    pub fn position(&self) -> u64 {
        self.range.map_or(0, |r| r.start)
    }

    /// Requested length, if known up front.
    pub fn length(&self) -> Option<u64> {
        self.range.and_then(|r| r.len())
    }

    /// Same bytes at another location.
    pub fn with_url(&self, url: Url) -> Self {
        Self {
            url,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug)]
pub struct NetOptions {
    /// Bound on connecting and on opening a response.
    pub request_timeout: Duration,
    /// Longest wait for the next body bytes.
    pub read_timeout: Duration,
    /// Max idle connections per host. Set to 0 to disable pooling.
    pub pool_max_idle_per_host: usize,
    pub user_agent: Option<String>,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 0,
            user_agent: None,
        }
    }
}

impl NetOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_pool_max_idle_per_host(mut self, n: usize) -> Self {
        self.pool_max_idle_per_host = n;
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, agent: S) -> Self {
        self.user_agent = Some(agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::bounded(0, Some(100), "bytes=0-100")]
    #[case::open_ended(50, None, "bytes=50-")]
    #[case::single_byte(10, Some(10), "bytes=10-10")]
    fn range_header_value(#[case] start: u64, #[case] end: Option<u64>, #[case] expected: &str) {
        assert_eq!(RangeSpec::new(start, end).to_header_value(), expected);
    }

    #[rstest]
    #[case(0, 1, 0)]
    #[case(100, 50, 149)]
    #[case(4096, 204_800, 208_895)]
    fn range_from_offset_len(#[case] offset: u64, #[case] len: u64, #[case] end: u64) {
        let range = RangeSpec::from_offset_len(offset, len).unwrap();
        assert_eq!(range.end, Some(end));
        assert_eq!(range.len(), Some(len));
    }

    #[rstest]
    #[case::empty(0, 0)]
    #[case::overflow(u64::MAX, 2)]
    fn range_from_offset_len_rejects(#[case] offset: u64, #[case] len: u64) {
        assert!(matches!(
            RangeSpec::from_offset_len(offset, len),
            Err(NetError::InvalidRange(_))
        ));
    }

    #[test]
    fn open_range_has_no_length() {
        assert_eq!(RangeSpec::from_start(7).len(), None);
    }

    #[test]
    fn data_spec_position_and_length() {
        let url = Url::parse("https://cdn-a.test/v/720/seg-3.m4s").unwrap();
        let spec = DataSpec::new(url.clone());
        assert_eq!(spec.position(), 0);
        assert_eq!(spec.length(), None);

        let spec = spec
            .with_range(RangeSpec::from_offset_len(1000, 500).unwrap())
            .with_key("720/3");
        assert_eq!(spec.position(), 1000);
        assert_eq!(spec.length(), Some(500));

        let moved = spec.with_url(Url::parse("https://cdn-b.test/v/720/seg-3.m4s").unwrap());
        assert_eq!(moved.range, spec.range);
        assert_eq!(moved.key.as_deref(), Some("720/3"));
        assert_ne!(moved.url, url);
    }

    #[test]
    fn headers_insert_and_get() {
        let mut headers = Headers::new();
        assert!(headers.is_empty());
        headers.insert("Content-Type", "video/mp4");
        assert_eq!(headers.get("Content-Type"), Some("video/mp4"));
        assert_eq!(headers.get("content-type"), None);
        assert_eq!(headers.iter().count(), 1);
    }
}
