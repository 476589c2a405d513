//! Fetcher Adapter boundary.
//!
//! The orchestrator only sees `Fetcher`; `net::HttpFetcher` is the reqwest
//! implementation and tests plug in their own.

use async_trait::async_trait;
use select::{document::Document, predicate::Name};
use snaphound_core::{FetchOutcome, Header, PageMeta};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: String,
    pub final_url: String,
    /// Every URL visited after the first one, in order.
    pub redirect_chain: Vec<String>,
    /// Why the certificate would have been rejected, if it was.
    pub cert_error: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("timed out")]
    Timeout,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("TLS failure: {0}")]
    Tls(String),
    #[error("bad URL: {0}")]
    BadUrl(String),
    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),
    #[error("host unreachable: {0}")]
    Offline(String),
    #[error("{0}")]
    Other(String),
}

impl From<&FetchError> for FetchOutcome {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Timeout => FetchOutcome::Timeout,
            FetchError::ConnectionRefused => FetchOutcome::ConnectionRefused,
            FetchError::Tls(msg) => FetchOutcome::TlsError(msg.clone()),
            FetchError::BadUrl(msg) => FetchOutcome::BadUrl(msg.clone()),
            FetchError::TooManyRedirects(_) => {
                FetchOutcome::UnknownError("too many redirects".to_string())
            }
            FetchError::Offline(_) => FetchOutcome::Offline,
            FetchError::Other(msg) => FetchOutcome::UnknownError(msg.clone()),
        }
    }
}

/// One network attempt per call; the implementation must give up by `timeout`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// Map a completed HTTP exchange onto the outcome taxonomy.
pub fn outcome_for_response(resp: FetchResponse) -> FetchOutcome {
    match resp.status {
        401 | 403 => FetchOutcome::Unauthorized {
            status: resp.status,
            headers: resp.headers,
        },
        status => FetchOutcome::Success(PageMeta {
            status,
            title: extract_title(&resp.body),
            final_url: resp.final_url,
            headers: resp.headers,
            cert_error: resp.cert_error,
            body: resp.body,
        }),
    }
}

/// Text of the first `<title>`, whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Document::from(html);
    let raw = doc.find(Name("title")).next()?.text();
    let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}
