use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

use crate::layout::checked_browser;

/// Default mismatch tolerance, in percent
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Pause between the diff completing and the outcome being classified
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Command-line flag that switches on update-baselines mode
pub const UPDATE_BASELINES_FLAG: &str = "-u";

/// Environment prefix for configuration overrides (`VISUAL_BROWSER`, ...)
pub const ENV_PREFIX: &str = "VISUAL";

/// Configuration for visual regression assertions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Browser identifier used to partition every output directory
    pub browser: String,

    /// Directory the baseline and artifact roots are resolved against
    pub root_dir: PathBuf,

    /// Maximum accepted mismatch percentage when a call gives none
    pub tolerance: f64,

    /// Settle delay in milliseconds before classifying a comparison
    pub settle_delay_ms: u64,

    /// Overwrite baselines with failing screenshots
    pub update_baselines: bool,

    /// WebDriver server URL
    pub webdriver_url: String,

    /// Whether to run the browser in headless mode
    pub headless: bool,

    /// Width of the browser viewport
    pub viewport_width: u32,

    /// Height of the browser viewport
    pub viewport_height: u32,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            browser: "chrome".to_string(),
            root_dir: PathBuf::from("."),
            tolerance: DEFAULT_TOLERANCE,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            update_baselines: false,
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
            viewport_width: 1280,
            viewport_height: 800,
        }
    }
}

impl VisualConfig {
    /// Loads configuration from defaults, an optional file and `VISUAL_*` variables
    ///
    /// A file passed explicitly must exist. Later sources override earlier ones.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Self::default())
                .context("Failed to build default configuration")?);

        if let Some(path) = file {
            debug!("Loading configuration file {}", path.display());
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to load configuration")?;

        let loaded: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        validate_tolerance(loaded.tolerance)?;
        checked_browser(&loaded.browser)?;

        trace!("Loaded configuration: {:?}", loaded);
        Ok(loaded)
    }

    /// Switches on update-baselines mode if the process was started with `-u`
    ///
    /// For harnesses that own argument parsing themselves.
    pub fn with_process_args(mut self) -> Self {
        if update_baselines_from_args(std::env::args()) {
            debug!("Update-baselines mode enabled from process arguments");
            self.update_baselines = true;
        }
        self
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn viewport_size(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }
}

/// Returns true when the update-baselines flag appears in `args`
///
/// The first element is the program name and is skipped.
pub fn update_baselines_from_args<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .skip(1)
        .any(|arg| arg.as_ref() == UPDATE_BASELINES_FLAG)
}

/// Checks that a tolerance is a percentage in `[0, 100]`
pub fn validate_tolerance(tolerance: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&tolerance) {
        bail!("Tolerance must be a percentage between 0 and 100, got {}", tolerance);
    }
    Ok(tolerance)
}
