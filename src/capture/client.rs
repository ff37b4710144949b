use anyhow::{Context, Result};
use fantoccini::{Client, ClientBuilder};
use tracing::{debug, error, trace};

use crate::capture::config;

/// Builds the `goog:chromeOptions` capabilities for a new session
pub fn chrome_capabilities(
    headless: bool,
    viewport_size: Option<(u32, u32)>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut caps = serde_json::map::Map::new();
    let mut chrome_opts = serde_json::map::Map::new();

    let args = config::chrome_arguments(headless, viewport_size);
    trace!("Setting Chrome arguments: {:?}", args);
    chrome_opts.insert("args".to_string(), serde_json::Value::Array(
        args.into_iter().map(serde_json::Value::String).collect()
    ));
    chrome_opts.insert("prefs".to_string(), serde_json::Value::Object(config::chrome_preferences()));

    caps.insert("goog:chromeOptions".to_string(), serde_json::Value::Object(chrome_opts));
    caps
}

/// Creates a new WebDriver client with the specified configuration
///
/// # Arguments
/// * `webdriver_url` - WebDriver server URL
/// * `viewport_size` - Optional viewport dimensions
/// * `headless` - Whether to run in headless mode
pub async fn create_client(
    webdriver_url: &str,
    viewport_size: Option<(u32, u32)>,
    headless: bool,
) -> Result<Client> {
    debug!("Connecting to WebDriver at {} (headless={})", webdriver_url, headless);
    let client = match ClientBuilder::native()
        .capabilities(chrome_capabilities(headless, viewport_size))
        .connect(webdriver_url)
        .await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to WebDriver at {}: {}", webdriver_url, e);
                return Err(e).context(format!("Failed to connect to WebDriver at {}", webdriver_url));
            }
        };

    if let Some((width, height)) = viewport_size {
        debug!("Setting viewport size to {}x{}", width, height);
        client
            .set_window_size(width, height)
            .await
            .with_context(|| format!("Failed to set window size to {}x{}", width, height))?;
    }

    trace!("Successfully created WebDriver client");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_capabilities_shape() {
        let caps = chrome_capabilities(true, Some((800, 600)));
        let opts = caps["goog:chromeOptions"].as_object().unwrap();
        let args = opts["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--window-size=800,600"));
        assert!(opts["prefs"].is_object());
    }
}
