//! Renderer Adapter boundary.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("capture timed out")]
    Timeout,
    #[error("browser unavailable: {0}")]
    Browser(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// Turns a URL into PNG bytes.
///
/// Implementations receive the deadline and are expected to stop their own
/// work when it passes; the orchestrator additionally stops waiting at the
/// same deadline.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn capture(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, CaptureError>;
}
