use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::{Client, Locator};
use std::fmt;
use std::fs;
use std::path::Path;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::capture::client::create_client;
use crate::capture::config::PAGE_RENDER_DELAY;
use crate::capture::ScreenshotDriver;
use crate::config::VisualConfig;

/// Captures screenshots from a single WebDriver session
///
/// The session is opened on first use and reused until [`close`](Self::close).
pub struct WebDriverCapture {
    webdriver_url: String,
    viewport_size: Option<(u32, u32)>,
    headless: bool,
    client: Mutex<Option<Client>>,
}

impl fmt::Debug for WebDriverCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDriverCapture")
            .field("webdriver_url", &self.webdriver_url)
            .field("viewport_size", &self.viewport_size)
            .field("headless", &self.headless)
            .finish()
    }
}

impl WebDriverCapture {
    pub fn new(webdriver_url: &str, viewport_size: Option<(u32, u32)>, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            viewport_size,
            headless,
            client: Mutex::new(None),
        }
    }

    pub fn from_config(config: &VisualConfig) -> Self {
        Self::new(&config.webdriver_url, Some(config.viewport_size()), config.headless)
    }

    /// Returns the live session, connecting if there is none yet
    async fn client(&self) -> Result<Client> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = create_client(&self.webdriver_url, self.viewport_size, self.headless).await?;
        info!("Opened WebDriver session at {}", self.webdriver_url);
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Loads `url` and waits for the page body to render
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let parsed = url::Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
        let client = self.client().await?;

        debug!("Navigating to URL: {}", parsed);
        client
            .goto(parsed.as_str())
            .await
            .with_context(|| format!("Failed to navigate to {}", parsed))?;

        client
            .wait()
            .forever()
            .for_element(Locator::Css("body"))
            .await
            .context("Failed to wait for page to load")?;

        trace!("Waiting {:?} for page content to render", PAGE_RENDER_DELAY);
        sleep(PAGE_RENDER_DELAY).await;
        Ok(())
    }

    /// Ends the WebDriver session, if one was opened
    pub async fn close(&self) -> Result<()> {
        let client = self.client.lock().await.take();
        match client {
            Some(client) => {
                info!("Closing WebDriver session");
                if let Err(e) = client.close().await {
                    error!("Failed to close WebDriver client: {}", e);
                    return Err(e).context("Failed to close WebDriver client");
                }
            }
            None => warn!("close() called without an open WebDriver session"),
        }
        Ok(())
    }
}

#[async_trait]
impl ScreenshotDriver for WebDriverCapture {
    async fn capture(&self, path: &Path) -> Result<()> {
        let client = self.client().await?;

        debug!("Capturing screenshot");
        let data = client.screenshot().await.context("Failed to capture screenshot")?;
        trace!("Screenshot captured successfully, {} bytes", data.len());

        fs::write(path, &data)
            .with_context(|| format!("Failed to write screenshot to {}", path.display()))?;
        Ok(())
    }
}
