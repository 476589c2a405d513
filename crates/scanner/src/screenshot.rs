use crate::{
    browser_manager::BrowserManager,
    capture::{CaptureError, Renderer},
};
use async_trait::async_trait;
use headless_chrome::{
    protocol::{network::methods::Enable as EnableNetwork, page::ScreenshotFormat, Method},
    Tab,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::Semaphore, task};
use tracing::debug;

/// PNG screenshots through a shared headless Chrome.
pub struct ChromeRenderer {
    browser: Arc<BrowserManager>,
    delay: Duration,
    cookies: Option<String>,
    /// One permit per tab that may be open at once.
    slots: Arc<Semaphore>,
}

impl ChromeRenderer {
    pub fn new(
        window_size: (u32, u32),
        delay: Duration,
        max_tabs: usize,
        cookies: Option<String>,
    ) -> Self {
        Self {
            browser: Arc::new(BrowserManager::new(window_size)),
            delay,
            cookies,
            slots: Arc::new(Semaphore::new(max_tabs.max(1))),
        }
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn capture(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, CaptureError> {
        let url = url.to_string();
        let manager = self.browser.clone();
        let delay = self.delay;
        let cookies = self.cookies.clone();

        gated(&self.slots, move || {
            shoot(&manager, &url, Deadline::after(timeout), delay, cookies.as_deref())
        })
        .await?
    }
}

/// Run `job` on the blocking pool while holding one of `slots`.
///
/// The permit moves into the job, so a caller that stops waiting does not
/// hand the slot to the next capture while the abandoned one is still
/// driving a tab.
async fn gated<R, F>(slots: &Arc<Semaphore>, job: F) -> Result<R, CaptureError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let permit = slots
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| CaptureError::Browser("capture slots closed".into()))?;
    task::spawn_blocking(move || {
        let _permit = permit;
        job()
    })
    .await
    .map_err(|e| CaptureError::Browser(format!("JoinError: {e}")))
}

/// One wall-clock budget for every step of a capture.
struct Deadline(Instant);

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    fn remaining(&self) -> Result<Duration, CaptureError> {
        let left = self.0.saturating_duration_since(Instant::now());
        if left.is_zero() {
            Err(CaptureError::Timeout)
        } else {
            Ok(left)
        }
    }
}

#[derive(Debug, Serialize)]
struct SetExtraHttpHeaders<'a> {
    headers: HashMap<&'a str, &'a str>,
}

#[derive(Debug, Deserialize)]
struct SetExtraHttpHeadersReturnObject {}

impl Method for SetExtraHttpHeaders<'_> {
    const NAME: &'static str = "Network.setExtraHTTPHeaders";
    type ReturnObject = SetExtraHttpHeadersReturnObject;
}

#[derive(Debug, Serialize)]
struct SetIgnoreCertificateErrors {
    ignore: bool,
}

#[derive(Debug, Deserialize)]
struct SetIgnoreCertificateErrorsReturnObject {}

impl Method for SetIgnoreCertificateErrors {
    const NAME: &'static str = "Security.setIgnoreCertificateErrors";
    type ReturnObject = SetIgnoreCertificateErrorsReturnObject;
}

#[derive(Debug, Serialize)]
struct ClosePage {}

#[derive(Debug, Deserialize)]
struct ClosePageReturnObject {}

impl Method for ClosePage {
    const NAME: &'static str = "Page.close";
    type ReturnObject = ClosePageReturnObject;
}

fn shoot(
    manager: &BrowserManager,
    url: &str,
    deadline: Deadline,
    delay: Duration,
    cookies: Option<&str>,
) -> Result<Vec<u8>, CaptureError> {
    for attempt in 1..=2 {
        let browser = manager
            .get()
            .map_err(|e| CaptureError::Browser(e.to_string()))?;
        deadline.remaining()?;

        let tab = match browser.new_tab() {
            Ok(tab) => tab,
            Err(e) => {
                let msg = e.to_string();
                if attempt == 1 && (msg.contains("connection is closed") || msg.contains("WebSocket")) {
                    let _ = manager.invalidate();
                    continue;
                }
                return Err(CaptureError::Browser(format!("opening tab: {msg}")));
            }
        };

        let result = render(&tab, url, &deadline, delay, cookies);
        if let Err(e) = tab.call_method(ClosePage {}) {
            debug!(url, "closing tab: {e}");
        }
        return result;
    }
    Err(CaptureError::Browser("could not open a tab after relaunch".into()))
}

/// Each step gets only what is left of the deadline. Bad certificates are
/// ignored; the fetch pass has already noted them.
fn render(
    tab: &Tab,
    url: &str,
    deadline: &Deadline,
    delay: Duration,
    cookies: Option<&str>,
) -> Result<Vec<u8>, CaptureError> {
    tab.set_default_timeout(deadline.remaining()?);
    tab.call_method(SetIgnoreCertificateErrors { ignore: true })
        .map_err(nav)?;

    if let Some(cookies) = cookies {
        tab.call_method(EnableNetwork {}).map_err(nav)?;
        let headers = HashMap::from([("Cookie", cookies)]);
        tab.call_method(SetExtraHttpHeaders { headers }).map_err(nav)?;
    }

    tab.set_default_timeout(deadline.remaining()?);
    tab.navigate_to(url).map_err(nav)?;
    tab.set_default_timeout(deadline.remaining()?);
    tab.wait_until_navigated().map_err(nav)?;

    let pause = delay.min(deadline.remaining()?);
    if !pause.is_zero() {
        std::thread::sleep(pause);
    }

    tab.set_default_timeout(deadline.remaining()?);
    tab.capture_screenshot(ScreenshotFormat::PNG, None, true)
        .map_err(nav)
}

fn nav(e: impl std::fmt::Display) -> CaptureError {
    navigation_error(&e.to_string())
}

fn navigation_error(msg: &str) -> CaptureError {
    if msg.to_lowercase().contains("timeout") || msg.contains("timed out") {
        CaptureError::Timeout
    } else {
        CaptureError::Navigation(msg.to_string())
    }
}
