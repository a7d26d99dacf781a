use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, trace};
use url::Url;

use crate::{
    ByteStream,
    error::{NetError, NetResult},
    traits::Net,
    types::{Headers, NetOptions, RangeSpec},
};

/// reqwest-backed [`Net`].
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns [`NetError::Http`] if the underlying client cannot be built.
    pub fn new(options: NetOptions) -> NetResult<Self> {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .connect_timeout(options.request_timeout)
            .read_timeout(options.read_timeout);
        if let Some(agent) = &options.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let inner = builder.build()?;
        Ok(Self { inner, options })
    }

    pub fn options(&self) -> &NetOptions {
        &self.options
    }

    fn apply_headers(mut req: RequestBuilder, headers: Option<Headers>) -> RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }

    async fn check(url: Url, resp: Response) -> NetResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.ok().filter(|b| !b.is_empty());
        debug!(%url, status = status.as_u16(), "request rejected");
        Err(NetError::HttpError {
            url,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError> {
        trace!(%url, "opening stream");
        let req = Self::apply_headers(self.inner.get(url.clone()), headers);
        let resp = Self::check(url, req.send().await?).await?;
        Ok(Box::pin(resp.bytes_stream().map_err(NetError::from)))
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError> {
        let header = range.to_header_value();
        trace!(%url, range = %header, "opening range");
        let req = self.inner.get(url.clone()).header("Range", header);
        let req = Self::apply_headers(req, headers);
        let resp = Self::check(url, req.send().await?).await?;
        Ok(Box::pin(resp.bytes_stream().map_err(NetError::from)))
    }
}
