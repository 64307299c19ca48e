//! Page rendering backends.
//!
//! A renderer turns a listing URL into the page markup after client-side
//! scripts have settled. Every backend bounds its own latency; running out of
//! time is reported as `RenderError::Timeout`.
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{RenderBackend, RenderSettings};

pub mod chrome;
pub mod http;

pub use chrome::ChromeRenderer;
pub use http::HttpRenderer;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to launch browser: {0}")]
    Launch(#[source] std::io::Error),
    #[error("browser exited with {status}: {stderr}")]
    Browser { status: String, stderr: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("rendered page is not valid UTF-8")]
    Encoding,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, RenderError>;
}

/// Build the renderer selected in the configuration.
pub fn from_settings(settings: &RenderSettings) -> Result<Arc<dyn Renderer>, RenderError> {
    let renderer: Arc<dyn Renderer> = match settings.backend {
        RenderBackend::Chrome => Arc::new(ChromeRenderer::new(
            settings.chrome_path.clone(),
            settings.settle_delay(),
            settings.timeout(),
        )),
        RenderBackend::Http => Arc::new(HttpRenderer::new(settings.timeout())?),
    };
    Ok(renderer)
}
