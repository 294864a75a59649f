//! Archive download with retry on transient transport failures.
//!
//! The [`Fetcher`] trait is the network seam: the orchestrator only ever sees
//! whole archive bodies, so tests can substitute an in-memory fetcher.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::Reporter;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transfer interrupted: {0}")]
    Interrupted(String),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Invalid request: {0}")]
    Invalid(String),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    ///
    /// Connection, timeout and mid-transfer failures are transient, as are
    /// server errors and rate limiting. Any other HTTP status is a property
    /// of the archive itself.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) | Self::Interrupted(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Invalid(_) => false,
        }
    }
}

#[cfg(feature = "network")]
impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_request() || e.is_body() || e.is_decode() {
            Self::Interrupted(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            Self::Invalid(e.to_string())
        }
    }
}

/// Downloads a whole archive body.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for std::sync::Arc<T> {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        (**self).fetch(url).await
    }
}

/// HTTPS fetcher backed by a shared `reqwest` client.
#[cfg(feature = "network")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "network")]
impl HttpFetcher {
    /// Build a client with the crate user agent and a per-request timeout.
    pub fn new(timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Invalid(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "network")]
#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        use futures::StreamExt;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut body = bytes::BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(body.freeze())
    }
}

/// The last error of a fetch that did not succeed, with the attempts spent.
#[derive(Error, Debug)]
#[error("{source} (after {attempts} attempt(s))")]
pub struct FetchFailure {
    pub attempts: u32,
    #[source]
    pub source: FetchError,
}

impl FetchFailure {
    /// True when every attempt failed transiently and the budget ran out.
    pub fn is_exhausted(&self) -> bool {
        self.source.is_transient()
    }
}

/// Fetch `url`, retrying transient failures immediately up to `attempts` times.
///
/// Non-transient errors return after the first attempt.
pub async fn fetch_with_retry<F, R>(
    fetcher: &F,
    url: &str,
    attempts: u32,
    reporter: &R,
) -> Result<Bytes, FetchFailure>
where
    F: Fetcher + ?Sized,
    R: Reporter + ?Sized,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        reporter.fetching(url, attempt);
        match fetcher.fetch(url).await {
            Ok(bytes) => {
                debug!(url, attempt, size = bytes.len(), "fetched archive");
                return Ok(bytes);
            }
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(url, attempt, error = %e, "transient fetch failure, retrying");
                reporter.retrying(url, attempt, &e.to_string());
                attempt += 1;
            }
            Err(source) => {
                return Err(FetchFailure {
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}
