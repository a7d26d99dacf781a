use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use url::Url;

use crate::{
    error::NetError,
    timeout::TimeoutNet,
    types::{DataSpec, Headers, RangeSpec},
};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

#[async_trait]
pub trait Net: Send + Sync {
    /// Stream bytes from a URL
    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError>;

    /// Get a range of bytes from a URL
    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError>;

    /// Open the bytes described by `spec`.
    async fn open(&self, spec: &DataSpec) -> Result<ByteStream, NetError> {
        match spec.range {
            Some(range) => self.get_range(spec.url.clone(), range, None).await,
            None => self.stream(spec.url.clone(), None).await,
        }
    }

    /// Whether transfers through this source cross the network. Bandwidth
    /// estimation ignores local transfers.
    fn is_network(&self) -> bool {
        true
    }
}

pub trait NetExt: Net + Sized {
    /// Add timeout layer
    fn with_timeout(self, timeout: Duration) -> TimeoutNet<Self> {
        TimeoutNet::new(self, timeout)
    }
}

impl<T: Net> NetExt for T {}
