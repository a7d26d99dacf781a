//! Scripted in-memory [`Net`] for loader tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use cadenza_net::{ByteStream, Headers, Net, NetError, RangeSpec};
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use url::Url;

/// One request seen by a [`MemoryNet`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub url: Url,
    pub range: Option<RangeSpec>,
}

#[derive(Clone, Debug)]
enum Script {
    /// The request fails before any byte.
    Fail(NetError),
    /// The body yields `after` bytes, then fails.
    FailAfter { after: usize, error: NetError },
    /// The request never completes.
    Stall,
    /// The body yields `after` bytes, then never another.
    StallAfter { after: usize },
}

#[derive(Default)]
struct State {
    resources: HashMap<Url, Bytes>,
    scripts: HashMap<Url, VecDeque<Script>>,
    requests: Vec<Request>,
}

/// In-memory network serving registered resources.
///
/// Unknown URLs answer 404. Failures are scripted per URL and consumed in
/// order, one per request; once a URL's script runs out it is served
/// normally. Clones share resources, scripts and the request log.
#[derive(Clone)]
pub struct MemoryNet {
    state: Arc<Mutex<State>>,
    chunk_size: usize,
    chunk_delay: Option<Duration>,
    network: bool,
}

impl Default for MemoryNet {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            chunk_size: 16 * 1024,
            chunk_delay: None,
            network: true,
        }
    }

    /// Body chunk length handed to the consumer.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pause before every body chunk.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_network(mut self, network: bool) -> Self {
        self.network = network;
        self
    }

    #[must_use]
    pub fn with_resource(self, url: Url, body: impl Into<Bytes>) -> Self {
        self.insert(url, body);
        self
    }

    pub fn insert(&self, url: Url, body: impl Into<Bytes>) {
        self.state.lock().resources.insert(url, body.into());
    }

    pub fn fail_next(&self, url: &Url, error: NetError) {
        self.push_script(url, Script::Fail(error));
    }

    pub fn fail_times(&self, url: &Url, error: &NetError, times: usize) {
        for _ in 0..times {
            self.fail_next(url, error.clone());
        }
    }

    pub fn fail_after(&self, url: &Url, after: usize, error: NetError) {
        self.push_script(url, Script::FailAfter { after, error });
    }

    pub fn stall_next(&self, url: &Url) {
        self.push_script(url, Script::Stall);
    }

    pub fn stall_body_after(&self, url: &Url, after: usize) {
        self.push_script(url, Script::StallAfter { after });
    }

    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    #[must_use]
    pub fn request_count(&self, url: &Url) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| &r.url == url)
            .count()
    }

    fn push_script(&self, url: &Url, script: Script) {
        self.state
            .lock()
            .scripts
            .entry(url.clone())
            .or_default()
            .push_back(script);
    }

    /// Log the request and decide its outcome.
    fn resolve(
        &self,
        url: &Url,
        range: Option<RangeSpec>,
    ) -> Result<(Bytes, Option<Script>), NetError> {
        let mut state = self.state.lock();
        state.requests.push(Request {
            url: url.clone(),
            range,
        });
        let script = state.scripts.get_mut(url).and_then(VecDeque::pop_front);
        if let Some(Script::Fail(error)) = script {
            return Err(error);
        }
        let body = state
            .resources
            .get(url)
            .cloned()
            .ok_or_else(|| NetError::http_status(url.clone(), 404))?;
        let body = match range {
            Some(range) => slice(url, &body, range)?,
            None => body,
        };
        Ok((body, script))
    }

    fn body_stream(&self, body: Bytes, script: Option<Script>) -> ByteStream {
        let (limit, tail, stalls) = match script {
            Some(Script::FailAfter { after, error }) => (after.min(body.len()), Some(error), false),
            Some(Script::StallAfter { after }) => (after.min(body.len()), None, true),
            _ => (body.len(), None, false),
        };
        let mut items: Vec<Result<Bytes, NetError>> = body
            .slice(..limit)
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if let Some(error) = tail {
            items.push(Err(error));
        }

        let items: ByteStream = match self.chunk_delay {
            Some(delay) => Box::pin(stream::iter(items).then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            })),
            None => Box::pin(stream::iter(items)),
        };
        if stalls {
            Box::pin(items.chain(stream::pending()))
        } else {
            items
        }
    }

    async fn open_body(&self, url: Url, range: Option<RangeSpec>) -> Result<ByteStream, NetError> {
        let (body, script) = self.resolve(&url, range)?;
        if matches!(script, Some(Script::Stall)) {
            futures::future::pending::<()>().await;
        }
        Ok(self.body_stream(body, script))
    }
}

fn slice(url: &Url, body: &Bytes, range: RangeSpec) -> Result<Bytes, NetError> {
    let len = body.len() as u64;
    if range.start >= len {
        return Err(NetError::http_status(url.clone(), 416));
    }
    let end = range.end.map_or(len, |end| (end + 1).min(len));
    let (Ok(start), Ok(end)) = (usize::try_from(range.start), usize::try_from(end)) else {
        return Err(NetError::InvalidRange(range.to_header_value()));
    };
    Ok(body.slice(start..end))
}

#[async_trait]
impl Net for MemoryNet {
    async fn stream(&self, url: Url, _headers: Option<Headers>) -> Result<ByteStream, NetError> {
        self.open_body(url, None).await
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        _headers: Option<Headers>,
    ) -> Result<ByteStream, NetError> {
        self.open_body(url, Some(range)).await
    }

    fn is_network(&self) -> bool {
        self.network
    }
}
