use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;
use url::Url;

use crate::{
    ByteStream,
    error::NetError,
    traits::Net,
    types::{Headers, RangeSpec},
};

/// Timeout decorator for [`Net`] implementations.
///
/// Opening a stream must finish within the timeout, and so must every wait
/// for the next body item. A body that keeps delivering may take arbitrarily
/// long in total. A stalled body yields [`NetError::Timeout`] and ends.
pub struct TimeoutNet<N> {
    inner: N,
    timeout: Duration,
}

impl<N: Net> TimeoutNet<N> {
    pub fn new(inner: N, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Bound the wait for each item of `body` by `idle`.
fn idle_bounded(body: ByteStream, idle: Duration) -> ByteStream {
    Box::pin(futures::stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(item)) => Some((item, Some(body))),
            Ok(None) => None,
            Err(_) => {
                debug!(?idle, "body stalled");
                Some((Err(NetError::Timeout), None))
            }
        }
    }))
}

#[async_trait]
impl<N: Net> Net for TimeoutNet<N> {
    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError> {
        let body = tokio::time::timeout(self.timeout, self.inner.stream(url, headers))
            .await
            .map_err(|_| NetError::Timeout)??;
        Ok(idle_bounded(body, self.timeout))
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError> {
        let body = tokio::time::timeout(self.timeout, self.inner.get_range(url, range, headers))
            .await
            .map_err(|_| NetError::Timeout)??;
        Ok(idle_bounded(body, self.timeout))
    }

    fn is_network(&self) -> bool {
        self.inner.is_network()
    }
}
