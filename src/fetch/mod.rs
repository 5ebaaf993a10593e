use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;
use url::Url;

/// Retrieves the raw bytes behind a URL. Implementations block.
pub trait ImageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub type SharedImageFetcher = Arc<dyn ImageFetcher>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("http client init failed: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to '{url}' failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("'{url}' responded with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("reading body from '{url}' failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Plain GET over HTTP(S). No retries. `timeout` bounds the whole exchange;
/// `None` leaves it unbounded.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    timeout: Option<Duration>,
}

impl HttpFetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = parse_fetch_url(url)?;
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(FetchError::Client)?;
        let response = client
            .get(parsed)
            .send()
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })?;
        Ok(body.to_vec())
    }
}

pub fn parse_fetch_url(raw: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(raw.trim()).map_err(|source| FetchError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}
