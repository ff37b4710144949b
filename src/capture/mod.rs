//! Screenshot capture through a browser automation driver

pub mod client;
pub mod config;
pub mod webdriver;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub use webdriver::WebDriverCapture;

/// Anything that can write a screenshot of the current page to a file
#[async_trait]
pub trait ScreenshotDriver: Send + Sync {
    /// Captures the current page as PNG into `path`
    async fn capture(&self, path: &Path) -> Result<()>;
}
