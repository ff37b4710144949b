use std::time::Duration;

/// Delay after the page body appears so images and fonts can render
pub const PAGE_RENDER_DELAY: Duration = Duration::from_millis(500);

// Chrome browser arguments
pub fn chrome_arguments(headless: bool, viewport_size: Option<(u32, u32)>) -> Vec<String> {
    let mut args: Vec<String> = [
        "--no-sandbox",
        "--disable-gpu",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-notifications",
        "--disable-infobars",
        "--disable-background-timer-throttling",
        "--disable-backgrounding-occluded-windows",
        "--disable-renderer-backgrounding",
        "--hide-scrollbars",
        "--font-render-hinting=none",
        "--force-color-profile=srgb",
        "--force-device-scale-factor=1",
        "--mute-audio",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    // Screenshots are only comparable when every run renders at the same size
    if let Some((width, height)) = viewport_size {
        args.push(format!("--window-size={},{}", width, height));
    }
    if headless {
        args.push("--headless=new".to_string());
    }
    args
}

// Chrome content settings preferences
pub fn chrome_preferences() -> serde_json::Map<String, serde_json::Value> {
    let mut prefs = serde_json::Map::new();
    prefs.insert("profile.default_content_setting_values.images".to_string(), 1.into()); // 1 = allow
    prefs.insert("profile.managed_default_content_settings.javascript".to_string(), 1.into()); // 1 = allow
    prefs.insert("profile.managed_default_content_settings.notifications".to_string(), 2.into()); // 2 = block
    prefs.insert("profile.managed_default_content_settings.popups".to_string(), 2.into()); // 2 = block
    prefs.insert("profile.managed_default_content_settings.geolocation".to_string(), 2.into()); // 2 = block
    prefs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_argument() {
        assert!(chrome_arguments(true, None).contains(&"--headless=new".to_string()));
        assert!(!chrome_arguments(false, None).iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_window_size_argument() {
        let args = chrome_arguments(true, Some((1024, 768)));
        assert!(args.contains(&"--window-size=1024,768".to_string()));
        assert!(!chrome_arguments(true, None).iter().any(|a| a.starts_with("--window-size")));
    }
}
