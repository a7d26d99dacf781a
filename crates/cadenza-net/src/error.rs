use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("HTTP {status} for URL: {url}")]
    HttpError {
        url: Url,
        status: u16,
        body: Option<String>,
    },
    #[error("Invalid range header: {0}")]
    InvalidRange(String),
    #[error("Timeout")]
    Timeout,
    #[error("Cancelled")]
    Cancelled,
}

impl NetError {
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }

    pub fn http_status(url: Url, status: u16) -> Self {
        Self::HttpError {
            url,
            status,
            body: None,
        }
    }

    /// Client errors that describe the resource itself, not the transport.
    ///
    /// Retrying the same location will not help; another location or track
    /// might.
    pub fn is_resource_specific(&self) -> bool {
        match self {
            NetError::HttpError { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            NetError::InvalidRange(_) => true,
            _ => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        match (error.status(), error.url()) {
            (Some(status), Some(url)) => Self::HttpError {
                url: url.clone(),
                status: status.as_u16(),
                body: None,
            },
            _ if error.is_connect() => Self::Http(format!("connection failed: {error}")),
            _ if error.is_body() || error.is_request() => {
                Self::Http(format!("network error: {error}"))
            }
            _ => Self::Http(error.to_string()),
        }
    }
}

pub type NetResult<T> = Result<T, NetError>;
