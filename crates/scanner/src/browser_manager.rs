use anyhow::{anyhow, Result};
use headless_chrome::{Browser, LaunchOptionsBuilder};
use portpicker::pick_unused_port;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Lazily launched, shared headless Chrome. Relaunched after `invalidate`.
pub struct BrowserManager {
    inner: Mutex<Option<Arc<Browser>>>,
    window_size: (u32, u32),
}

impl BrowserManager {
    pub const fn new(window_size: (u32, u32)) -> Self {
        Self {
            inner: Mutex::new(None),
            window_size,
        }
    }

    fn launch_browser(&self) -> Result<Arc<Browser>> {
        let port = pick_unused_port().unwrap_or(0);
        let mut builder = LaunchOptionsBuilder::default();
        builder.headless(true);
        builder.port(Some(port));
        builder.window_size(Some(self.window_size));

        let launch_opts = builder
            .build()
            .map_err(|e| anyhow!("building LaunchOptions: {e}"))?;

        let browser =
            Browser::new(launch_opts).map_err(|e| anyhow!("starting headless chrome: {e}"))?;
        debug!(port, "launched headless chrome");
        Ok(Arc::new(browser))
    }

    pub fn get(&self) -> Result<Arc<Browser>> {
        // hold the lock across launch so concurrent callers share one browser
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| anyhow!("mutex poisoned in BrowserManager::get: {e}"))?;
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }

        let fresh = self.launch_browser()?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    pub fn invalidate(&self) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| anyhow!("mutex poisoned in BrowserManager::invalidate: {e}"))?;
        if guard.take().is_some() {
            warn!("dropping headless chrome connection, next capture relaunches it");
        }
        Ok(())
    }
}
