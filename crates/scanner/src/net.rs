use crate::fetch::{FetchError, FetchResponse, Fetcher};
use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, COOKIE, LOCATION},
    redirect::Policy,
    Client, Proxy, Response,
};
use std::{error::Error as StdError, io::ErrorKind};
use tokio::time::{timeout, Duration};
use tracing::debug;
use url::Url;

const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// reqwest-backed fetcher. Redirects are followed by hand so the chain can
/// be recorded and capped.
///
/// Requests go out with certificate checks on. A target whose certificate
/// is rejected is fetched again without them and the rejection is kept as a
/// note on the page.
pub struct HttpFetcher {
    strict: Client,
    lenient: Client,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(
        user_agent: Option<&str>,
        proxy: Option<&str>,
        cookies: Option<&str>,
        max_redirects: usize,
    ) -> AnyResult<Self> {
        Ok(Self {
            strict: build_client(user_agent, proxy, cookies, false)?,
            lenient: build_client(user_agent, proxy, cookies, true)?,
            max_redirects,
        })
    }

    async fn fetch_chain(&self, url: &str, per_request: Duration) -> Result<FetchResponse, FetchError> {
        let mut current = Url::parse(url).map_err(|e| FetchError::BadUrl(format!("{url}: {e}")))?;
        let mut chain = Vec::new();
        let mut cert_error = None;

        loop {
            let resp = self.send(&current, per_request, &mut cert_error).await?;

            let status = resp.status();
            if status.is_redirection() {
                if let Some(next) = redirect_target(&current, resp.headers().get(LOCATION)) {
                    if chain.len() >= self.max_redirects {
                        return Err(FetchError::TooManyRedirects(self.max_redirects));
                    }
                    debug!(from = %current, to = %next, "following redirect");
                    chain.push(next.to_string());
                    current = next;
                    continue;
                }
            }

            let headers = resp
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect();
            let final_url = resp.url().to_string();
            let body = resp.text().await.map_err(|e| classify_reqwest(&e))?;

            return Ok(FetchResponse {
                status: status.as_u16(),
                headers,
                body,
                final_url,
                redirect_chain: chain,
                cert_error,
            });
        }
    }

    /// One hop. Once a certificate has been rejected the rest of the chain
    /// goes through the lenient client.
    async fn send(
        &self,
        url: &Url,
        per_request: Duration,
        cert_error: &mut Option<String>,
    ) -> Result<Response, FetchError> {
        let client = if cert_error.is_some() { &self.lenient } else { &self.strict };
        let err = match client.get(url.clone()).timeout(per_request).send().await {
            Ok(resp) => return Ok(resp),
            Err(e) => e,
        };
        match certificate_problem(&err) {
            Some(reason) if cert_error.is_none() => {
                debug!(%url, "retrying without certificate checks: {reason}");
                *cert_error = Some(reason);
                self.lenient
                    .get(url.clone())
                    .timeout(per_request)
                    .send()
                    .await
                    .map_err(|e| classify_reqwest(&e))
            }
            _ => Err(classify_reqwest(&err)),
        }
    }
}

fn build_client(
    user_agent: Option<&str>,
    proxy: Option<&str>,
    cookies: Option<&str>,
    accept_invalid_certs: bool,
) -> AnyResult<Client> {
    let mut headers = HeaderMap::new();
    if let Some(cookies) = cookies {
        headers.insert(COOKIE, HeaderValue::from_str(cookies).context("cookie header")?);
    }
    let mut builder = Client::builder()
        .redirect(Policy::none())
        .user_agent(user_agent.unwrap_or(DEFAULT_UA))
        .default_headers(headers)
        .cookie_store(true)
        .danger_accept_invalid_certs(accept_invalid_certs);
    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy).with_context(|| format!("proxy {proxy}"))?);
    }
    builder.build().context("building HTTP client")
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, limit: Duration) -> Result<FetchResponse, FetchError> {
        // the deadline covers the whole redirect chain, not just one hop
        match timeout(limit, self.fetch_chain(url, limit)).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

fn redirect_target(base: &Url, location: Option<&HeaderValue>) -> Option<Url> {
    let raw = location?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    base.join(raw).ok()
}

/// Map a reqwest failure onto the fetch error taxonomy.
///
/// Only the error's sources are inspected. The top-level message embeds the
/// request URL, whose path must not decide the outcome.
pub(crate) fn classify_reqwest(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    if err.is_builder() {
        return FetchError::BadUrl(err.to_string());
    }

    let detail = match err.source() {
        Some(source) => error_chain(source),
        None => "request failed".to_string(),
    };

    if tls_error(err).is_some() {
        return FetchError::Tls(detail);
    }
    if let Some(kind) = io_kind(err) {
        match kind {
            ErrorKind::ConnectionRefused => return FetchError::ConnectionRefused,
            ErrorKind::TimedOut => return FetchError::Timeout,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::NotConnected => {
                return FetchError::Offline(detail)
            }
            _ => {}
        }
    }
    classify_detail(detail, err.is_connect())
}

/// Fallback for causes that carry no typed error, such as resolver failures.
fn classify_detail(detail: String, connecting: bool) -> FetchError {
    let lowered = detail.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lowered.contains(w));

    if mentions(&["dns error", "failed to lookup", "name or service not known"]) {
        return FetchError::BadUrl(detail);
    }
    if connecting && mentions(&["certificate", "tls", "ssl", "handshake"]) {
        return FetchError::Tls(detail);
    }
    if mentions(&["connection refused"]) {
        return FetchError::ConnectionRefused;
    }
    if mentions(&["unreachable", "connection reset"]) {
        return FetchError::Offline(detail);
    }
    FetchError::Other(detail)
}

/// The rejection message when `err` failed on the peer certificate.
fn certificate_problem(err: &(dyn StdError + 'static)) -> Option<String> {
    let tls = tls_error(err)?;
    matches!(tls, rustls::Error::InvalidCertificate(_)).then(|| tls.to_string())
}

/// The rustls error somewhere in `err`'s chain. rustls errors reach reqwest
/// wrapped in an `io::Error`, which does not expose them through `source()`.
fn tls_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a rustls::Error> {
    let mut source: Option<&'a (dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return Some(tls);
        }
        let wrapped = e
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io.get_ref())
            .and_then(|inner| inner.downcast_ref::<rustls::Error>());
        if wrapped.is_some() {
            return wrapped;
        }
        source = e.source();
    }
    None
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        parts.push(e.to_string());
        source = e.source();
    }
    parts.join(": ")
}

fn io_kind(err: &(dyn StdError + 'static)) -> Option<ErrorKind> {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = e.source();
    }
    None
}
