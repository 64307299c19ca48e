use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{RenderError, Renderer};

/// Renders pages with a headless Chromium, one short-lived process per URL.
///
/// `--virtual-time-budget` lets the page's scripts run for the settle delay
/// before `--dump-dom` prints the serialized document on stdout.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    binary: String,
    settle_delay: Duration,
    timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(binary: impl Into<String>, settle_delay: Duration, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            settle_delay,
            timeout,
        }
    }

    pub fn args(&self, url: &str) -> Vec<String> {
        vec![
            "--headless".into(),
            "--disable-gpu".into(),
            "--no-first-run".into(),
            "--hide-scrollbars".into(),
            format!("--virtual-time-budget={}", self.settle_delay.as_millis()),
            "--dump-dom".into(),
            url.to_string(),
        ]
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    #[instrument(skip(self), fields(binary = %self.binary))]
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let child = Command::new(&self.binary)
            .args(self.args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RenderError::Launch)?;

        // Dropping the timed-out future drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))?
            .map_err(RenderError::Launch)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Browser {
                status: output.status.to_string(),
                stderr: stderr.lines().last().unwrap_or_default().to_string(),
            });
        }
        let markup = String::from_utf8(output.stdout).map_err(|_| RenderError::Encoding)?;
        debug!(bytes = markup.len(), "page rendered");
        Ok(markup)
    }
}
