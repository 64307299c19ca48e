use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{RenderError, Renderer};

/// Fetches markup with a plain GET. Only suitable for listing pages that are
/// rendered server-side; no scripts run.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    http: Client,
    timeout: Duration,
}

impl HttpRenderer {
    pub fn new(timeout: Duration) -> Result<Self, RenderError> {
        let http = Client::builder()
            .user_agent(concat!("listing-watch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    #[instrument(skip(self))]
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let res = self.http.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                RenderError::Timeout(self.timeout)
            } else {
                RenderError::Http(err)
            }
        })?;
        if !res.status().is_success() {
            return Err(RenderError::Status(res.status()));
        }
        let markup = res.text().await?;
        debug!(bytes = markup.len(), "page fetched");
        Ok(markup)
    }
}
