use anyhow::{Context, Result};
use sanitize_filename::sanitize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::config::VisualConfig;

pub const BASELINE_ROOT: &str = "visual-regression-baseline";
pub const SCREENS_ROOT: &str = "artifacts/visual-regression/new-screens";
pub const DIFFS_ROOT: &str = "artifacts/visual-regression/diffs";

const POSITIVE: &str = "positive";
const NEGATIVE: &str = "negative";

/// Where baselines, captured screenshots and diff images live for one browser
///
/// ```text
/// <root>/visual-regression-baseline/<browser>/
/// <root>/artifacts/visual-regression/new-screens/<browser>/{positive,negative}/
/// <root>/artifacts/visual-regression/diffs/<browser>/{positive,negative}/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub baseline_dir: PathBuf,
    pub result_positive_dir: PathBuf,
    pub result_negative_dir: PathBuf,
    pub diff_positive_dir: PathBuf,
    pub diff_negative_dir: PathBuf,
}

impl DirectoryLayout {
    pub fn new(root: impl AsRef<Path>, browser: &str) -> Result<Self> {
        let root = root.as_ref();
        let browser = checked_browser(browser)?;
        let screens = root.join(SCREENS_ROOT).join(&browser);
        let diffs = root.join(DIFFS_ROOT).join(&browser);

        Ok(Self {
            baseline_dir: root.join(BASELINE_ROOT).join(&browser),
            result_positive_dir: screens.join(POSITIVE),
            result_negative_dir: screens.join(NEGATIVE),
            diff_positive_dir: diffs.join(POSITIVE),
            diff_negative_dir: diffs.join(NEGATIVE),
        })
    }

    pub fn from_config(config: &VisualConfig) -> Result<Self> {
        Self::new(&config.root_dir, &config.browser)
    }

    pub fn baseline(&self, filename: &str) -> PathBuf {
        self.baseline_dir.join(filename)
    }

    pub fn result_positive(&self, filename: &str) -> PathBuf {
        self.result_positive_dir.join(filename)
    }

    pub fn result_negative(&self, filename: &str) -> PathBuf {
        self.result_negative_dir.join(filename)
    }

    pub fn diff_positive(&self, filename: &str) -> PathBuf {
        self.diff_positive_dir.join(filename)
    }

    pub fn diff_negative(&self, filename: &str) -> PathBuf {
        self.diff_negative_dir.join(filename)
    }
}

/// Creates `dir` and any missing parents
pub fn ensure_dir(dir: &Path) -> Result<()> {
    trace!("Ensuring directory exists: {}", dir.display());
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Sanitizes a browser id into a single directory name
///
/// Ids that sanitize to nothing (`.`, `..`, `/`) would share the root folders
/// with every other browser and are rejected.
pub fn checked_browser(browser: &str) -> Result<String> {
    let sanitized = sanitize(browser);
    if sanitized.is_empty() {
        anyhow::bail!("Invalid browser identifier: {:?}", browser);
    }
    Ok(sanitized)
}

/// Rejects filenames that would escape the layout directories
pub fn checked_filename(filename: &str) -> Result<&str> {
    if filename.is_empty() || sanitize(filename) != filename {
        anyhow::bail!("Invalid screenshot filename: {:?}", filename);
    }
    Ok(filename)
}
