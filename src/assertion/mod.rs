//! Capture, compare, classify and report one screenshot against its baseline

pub mod model;

use anyhow::{bail, Context, Result};
use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::capture::ScreenshotDriver;
use crate::config::{validate_tolerance, VisualConfig};
use crate::diff::ImageDiffer;
use crate::layout::{checked_filename, ensure_dir, DirectoryLayout};

pub use model::{AssertionReport, ComparisonOutcome, ComparisonRequest, PendingComparison, Verdict};

/// Runs visual assertions for one browser
///
/// Every call carries its own state, so assertions for different filenames
/// may run concurrently. Two assertions for the same filename must not.
pub struct ScreenshotAssertion {
    config: VisualConfig,
    layout: DirectoryLayout,
    driver: Arc<dyn ScreenshotDriver>,
    differ: Arc<dyn ImageDiffer>,
}

impl ScreenshotAssertion {
    pub fn new(
        config: VisualConfig,
        driver: Arc<dyn ScreenshotDriver>,
        differ: Arc<dyn ImageDiffer>,
    ) -> Result<Self> {
        let layout = DirectoryLayout::from_config(&config)?;
        debug!("Visual assertions for {} rooted at {}", config.browser, config.root_dir.display());
        Ok(Self { config, layout, driver, differ })
    }

    pub fn config(&self) -> &VisualConfig {
        &self.config
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    /// Captures the current page into the positive results folder
    ///
    /// Capture failures are logged only; the comparison that follows reports
    /// the missing screenshot. Returns `None` without capturing when the
    /// filename would land outside the results folder.
    pub async fn save_screenshot(&self, filename: &str) -> Option<PathBuf> {
        let filename = match checked_filename(filename) {
            Ok(filename) => filename,
            Err(e) => {
                error!("Not capturing screenshot: {:#}", e);
                return None;
            }
        };
        let path = self.layout.result_positive(filename);

        if let Err(e) = ensure_dir(&self.layout.result_positive_dir) {
            error!("{:#}", e);
            return Some(path);
        }

        match self.driver.capture(&path).await {
            Ok(()) => info!("Screenshot saved to: {}", path.display()),
            Err(e) => error!("Failed to capture screenshot {}: {:#}", path.display(), e),
        }
        Some(path)
    }

    /// Bootstraps the baseline if needed and starts the diff in the background
    pub async fn start_comparison(&self, filename: &str, tolerance: Option<f64>) -> Result<PendingComparison> {
        let filename = checked_filename(filename)?;
        let tolerance = validate_tolerance(tolerance.unwrap_or(self.config.tolerance))?;

        ensure_dir(&self.layout.baseline_dir)?;
        ensure_dir(&self.layout.diff_positive_dir)?;

        let baseline_path = self.layout.baseline(filename);
        let result_path = self.layout.result_positive(filename);
        if !result_path.exists() {
            bail!("No screenshot captured for {}: {} does not exist", filename, result_path.display());
        }

        let bootstrapped = !baseline_path.exists();
        if bootstrapped {
            warn!("Baseline image does NOT exist: {}", baseline_path.display());
            info!("Creating baseline image from result: {}", baseline_path.display());
            fs::copy(&result_path, &baseline_path).with_context(|| {
                format!("Failed to create baseline {} from {}", baseline_path.display(), result_path.display())
            })?;
        }

        let differ = Arc::clone(&self.differ);
        let (baseline, candidate) = (baseline_path.clone(), result_path.clone());
        let handle = tokio::task::spawn_blocking(move || differ.compare(&baseline, &candidate));

        Ok(PendingComparison {
            request: ComparisonRequest { filename: filename.to_string(), tolerance },
            baseline_path,
            result_path,
            bootstrapped,
            handle,
        })
    }

    /// Waits for the diff and files the screenshot as positive or negative
    pub async fn resolve_outcome(&self, pending: PendingComparison) -> Result<ComparisonOutcome> {
        let PendingComparison { request, baseline_path, result_path, bootstrapped, handle } = pending;
        let filename = request.filename.as_str();

        let diff = match handle.await.context("Image comparison task failed")? {
            Ok(diff) => diff,
            Err(e) => {
                error!("Image comparison failed for {}: {:#}", filename, e);
                return Err(e);
            }
        };
        debug!("{}: {}% mismatch", filename, diff.mismatch_percentage);

        sleep(self.config.settle_delay()).await;
        ensure_dir(&self.layout.diff_negative_dir)?;

        let mismatch = diff.mismatch_percentage;
        let (verdict, diff_path, result_path) = if mismatch > request.tolerance {
            let diff_path = self.layout.diff_negative(filename);
            write_png(&diff.diff_image, &diff_path)?;

            let negative_path = self.layout.result_negative(filename);
            ensure_dir(&self.layout.result_negative_dir)?;
            if negative_path.exists() {
                fs::remove_file(&negative_path)
                    .with_context(|| format!("Failed to remove stale result {}", negative_path.display()))?;
            }
            fs::rename(&result_path, &negative_path).with_context(|| {
                format!("Failed to move {} to {}", result_path.display(), negative_path.display())
            })?;
            info!("Created diff image [negative]: {}", diff_path.display());

            (Verdict::Negative, diff_path, negative_path)
        } else {
            let diff_path = self.layout.diff_positive(filename);
            write_png(&diff.diff_image, &diff_path)?;
            (Verdict::Positive, diff_path, result_path)
        };

        Ok(ComparisonOutcome {
            request,
            mismatch_percentage: mismatch,
            verdict,
            baseline_path,
            result_path,
            diff_path,
            bootstrapped,
        })
    }

    /// Checks the outcome against its tolerance and builds the report
    ///
    /// A failing outcome overwrites the baseline when update-baselines mode is on.
    pub fn assert_pass(&self, outcome: &ComparisonOutcome) -> AssertionReport {
        let request = &outcome.request;
        let value = outcome.mismatch_percentage;
        let passed = value <= request.tolerance;

        let mut report = AssertionReport {
            filename: request.filename.clone(),
            tolerance: request.tolerance,
            mismatch_percentage: Some(value),
            passed,
            message: String::new(),
            baseline_path: outcome.baseline_path.clone(),
            result_path: outcome.result_path.clone(),
            diff_path: Some(outcome.diff_path.clone()),
            baseline_updated: false,
        };

        if passed {
            report.message = format!("Screenshots matched for {} with {}% difference.", request.filename, value);
            info!("{}", report.message);
            return report;
        }

        report.message = failure_message(outcome);
        error!("{}", report.message);

        if self.config.update_baselines {
            match fs::copy(&outcome.result_path, &outcome.baseline_path) {
                Ok(_) => {
                    info!("Updated baseline {} from {}", outcome.baseline_path.display(), outcome.result_path.display());
                    report.baseline_updated = true;
                }
                Err(e) => error!("Failed to update baseline {}: {}", outcome.baseline_path.display(), e),
            }
        }

        report
    }

    /// Compares a screenshot already in the positive results folder
    pub async fn compare_existing(&self, filename: &str, tolerance: Option<f64>) -> AssertionReport {
        let outcome = match self.start_comparison(filename, tolerance).await {
            Ok(pending) => self.resolve_outcome(pending).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(outcome) => self.assert_pass(&outcome),
            Err(e) => self.error_report(filename, tolerance, e),
        }
    }

    /// Captures the current page and asserts it against the baseline
    pub async fn assert_screenshot(&self, filename: &str, tolerance: Option<f64>) -> AssertionReport {
        self.save_screenshot(filename).await;
        self.compare_existing(filename, tolerance).await
    }

    fn error_report(&self, filename: &str, tolerance: Option<f64>, err: anyhow::Error) -> AssertionReport {
        let message = format!("Screenshot comparison failed for {}: {:#}", filename, err);
        error!("{}", message);

        AssertionReport {
            filename: filename.to_string(),
            tolerance: tolerance.unwrap_or(self.config.tolerance),
            mismatch_percentage: None,
            passed: false,
            message,
            baseline_path: self.layout.baseline(filename),
            result_path: self.layout.result_positive(filename),
            diff_path: None,
            baseline_updated: false,
        }
    }
}

fn write_png(image: &image::RgbaImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write diff image {}", path.display()))
}

fn failure_message(outcome: &ComparisonOutcome) -> String {
    let request = &outcome.request;
    let value = outcome.mismatch_percentage;
    let baseline = outcome.baseline_path.display();
    let result = outcome.result_path.display();
    let diff = outcome.diff_path.display();

    format!(
        "Screenshots match failed for {} with a tolerance difference of {}%.\n\
         \x20  Screenshots at:\n\
         \x20   Baseline: {}\n\
         \x20   Result: {}\n\
         \x20   Diff: {}\n\
         \x20  Open {} to see how the screenshot has changed.\n\
         \x20  If the Result Screenshot is correct you can use it to update the Baseline Screenshot and re-run your test:\n\
         \x20   cp {} {}\n\
         expected: {} but got: {}",
        request.filename,
        value - request.tolerance,
        baseline,
        result,
        diff,
        diff,
        result,
        baseline,
        request.tolerance,
        value,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffResult, PixelDiffer};
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes a fixed image on every capture
    struct ImageDriver {
        image: RgbaImage,
    }

    #[async_trait]
    impl ScreenshotDriver for ImageDriver {
        async fn capture(&self, path: &Path) -> Result<()> {
            write_png(&self.image, path)
        }
    }

    struct BrokenDriver;

    #[async_trait]
    impl ScreenshotDriver for BrokenDriver {
        async fn capture(&self, _path: &Path) -> Result<()> {
            bail!("WebDriver session lost")
        }
    }

    /// Reports a fixed mismatch regardless of input
    struct FixedDiffer {
        mismatch: f64,
    }

    impl ImageDiffer for FixedDiffer {
        fn compare(&self, _baseline: &Path, _candidate: &Path) -> Result<DiffResult> {
            Ok(DiffResult {
                mismatch_percentage: self.mismatch,
                diff_image: RgbaImage::new(1, 1),
                same_dimensions: true,
                dimension_difference: (0, 0),
                analysis_time: Duration::ZERO,
            })
        }
    }

    struct BrokenDiffer;

    impl ImageDiffer for BrokenDiffer {
        fn compare(&self, _baseline: &Path, _candidate: &Path) -> Result<DiffResult> {
            bail!("decoder exploded")
        }
    }

    fn solid(color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba(color))
    }

    fn assertion(
        dir: &TempDir,
        update_baselines: bool,
        driver: impl ScreenshotDriver + 'static,
        differ: impl ImageDiffer + 'static,
    ) -> ScreenshotAssertion {
        let config = VisualConfig {
            root_dir: dir.path().to_path_buf(),
            settle_delay_ms: 0,
            update_baselines,
            ..VisualConfig::default()
        };
        ScreenshotAssertion::new(config, Arc::new(driver), Arc::new(differ)).unwrap()
    }

    fn seed_baseline(assertion: &ScreenshotAssertion, filename: &str, image: &RgbaImage) -> Vec<u8> {
        let layout = assertion.layout();
        ensure_dir(&layout.baseline_dir).unwrap();
        write_png(image, &layout.baseline(filename)).unwrap();
        fs::read(layout.baseline(filename)).unwrap()
    }

    #[tokio::test]
    async fn test_small_mismatch_passes_and_stays_positive() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, ImageDriver { image: solid([0, 0, 0, 255]) }, FixedDiffer { mismatch: 0.05 });
        let baseline = seed_baseline(&assertion, "shot.png", &solid([9, 9, 9, 255]));

        let report = assertion.assert_screenshot("shot.png", Some(0.1)).await;
        let layout = assertion.layout();

        assert!(report.passed);
        assert_eq!(report.mismatch_percentage, Some(0.05));
        assert!(layout.result_positive("shot.png").exists());
        assert!(!layout.result_negative("shot.png").exists());
        assert!(layout.diff_positive("shot.png").exists());
        assert!(!layout.diff_negative("shot.png").exists());
        assert_eq!(fs::read(layout.baseline("shot.png")).unwrap(), baseline);
    }

    #[tokio::test]
    async fn test_large_mismatch_fails_and_moves_result() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, ImageDriver { image: solid([0, 0, 0, 255]) }, FixedDiffer { mismatch: 5.0 });
        let baseline = seed_baseline(&assertion, "shot.png", &solid([9, 9, 9, 255]));

        let report = assertion.assert_screenshot("shot.png", Some(0.1)).await;
        let layout = assertion.layout();
        let negative = layout.result_negative("shot.png");

        assert!(!report.passed);
        assert!(report.message.contains('5'));
        assert!(report.message.contains(&negative.display().to_string()));
        assert_eq!(report.result_path, negative);
        assert!(negative.exists());
        assert!(!layout.result_positive("shot.png").exists());
        assert!(layout.diff_negative("shot.png").exists());
        assert!(!report.baseline_updated);
        assert_eq!(fs::read(layout.baseline("shot.png")).unwrap(), baseline);
        assert!(report.into_result().is_err());
    }

    #[tokio::test]
    async fn test_missing_baseline_is_bootstrapped() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, ImageDriver { image: solid([30, 60, 90, 255]) }, PixelDiffer::default());

        let report = assertion.assert_screenshot("shot.png", None).await;
        let layout = assertion.layout();

        assert!(report.passed);
        assert_eq!(report.mismatch_percentage, Some(0.0));
        assert_eq!(
            fs::read(layout.baseline("shot.png")).unwrap(),
            fs::read(layout.result_positive("shot.png")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_update_mode_replaces_baseline_on_failure() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, true, ImageDriver { image: solid([255, 255, 255, 255]) }, PixelDiffer::default());
        seed_baseline(&assertion, "shot.png", &solid([0, 0, 0, 255]));

        let report = assertion.assert_screenshot("shot.png", None).await;
        let layout = assertion.layout();

        assert!(!report.passed);
        assert!(report.baseline_updated);
        assert_eq!(
            fs::read(layout.baseline("shot.png")).unwrap(),
            fs::read(layout.result_negative("shot.png")).unwrap()
        );

        // The accepted screenshot now passes
        let report = assertion.assert_screenshot("shot.png", None).await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn test_tolerance_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, ImageDriver { image: solid([0, 0, 0, 255]) }, FixedDiffer { mismatch: 0.1 });
        seed_baseline(&assertion, "shot.png", &solid([0, 0, 0, 255]));

        let report = assertion.assert_screenshot("shot.png", Some(0.1)).await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn test_stale_negative_result_is_replaced() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, ImageDriver { image: solid([0, 0, 0, 255]) }, FixedDiffer { mismatch: 50.0 });
        seed_baseline(&assertion, "shot.png", &solid([255, 255, 255, 255]));
        let layout = assertion.layout();
        ensure_dir(&layout.result_negative_dir).unwrap();
        fs::write(layout.result_negative("shot.png"), b"stale").unwrap();

        assertion.save_screenshot("shot.png").await;
        let captured = fs::read(layout.result_positive("shot.png")).unwrap();
        let report = assertion.compare_existing("shot.png", None).await;

        assert!(!report.passed);
        assert_eq!(fs::read(layout.result_negative("shot.png")).unwrap(), captured);
    }

    #[tokio::test]
    async fn test_step_by_step_outcome() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, ImageDriver { image: solid([0, 0, 0, 255]) }, FixedDiffer { mismatch: 2.0 });

        assertion.save_screenshot("shot.png").await;
        let pending = assertion.start_comparison("shot.png", Some(1.0)).await.unwrap();
        assert!(pending.bootstrapped);

        let outcome = assertion.resolve_outcome(pending).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Negative);
        assert_eq!(outcome.mismatch_percentage, 2.0);
        assert_eq!(outcome.diff_path, assertion.layout().diff_negative("shot.png"));

        let report = assertion.assert_pass(&outcome);
        assert!(!report.passed);
        assert!(report.message.contains("tolerance difference of 1%"));
    }

    #[tokio::test]
    async fn test_escaping_filename_is_never_captured() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, ImageDriver { image: solid([0, 0, 0, 255]) }, FixedDiffer { mismatch: 0.0 });

        assert_eq!(assertion.save_screenshot("../../../../../escaped.png").await, None);
        let report = assertion.assert_screenshot("../../../../../escaped.png", None).await;

        assert!(!report.passed);
        assert!(report.message.contains("Invalid screenshot filename"));
        assert!(!dir.path().join("escaped.png").exists());
        assert!(!assertion.layout().result_positive_dir.exists());
    }

    #[test]
    fn test_empty_browser_id_is_rejected() {
        let config = VisualConfig { browser: "..".to_string(), ..VisualConfig::default() };
        let result = ScreenshotAssertion::new(
            config,
            Arc::new(BrokenDriver),
            Arc::new(FixedDiffer { mismatch: 0.0 }),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_capture_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, BrokenDriver, FixedDiffer { mismatch: 0.0 });

        let report = assertion.assert_screenshot("shot.png", None).await;
        assert!(!report.passed);
        assert_eq!(report.mismatch_percentage, None);
        assert!(report.message.contains("No screenshot captured"));
        assert!(!assertion.layout().baseline("shot.png").exists());
    }

    #[tokio::test]
    async fn test_differ_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, ImageDriver { image: solid([0, 0, 0, 255]) }, BrokenDiffer);

        let report = assertion.assert_screenshot("shot.png", None).await;
        assert!(!report.passed);
        assert!(report.message.contains("decoder exploded"));
        // Nothing is moved when no verdict was reached
        assert!(assertion.layout().result_positive("shot.png").exists());
    }

    #[tokio::test]
    async fn test_invalid_tolerance_is_rejected() {
        let dir = TempDir::new().unwrap();
        let assertion = assertion(&dir, false, ImageDriver { image: solid([0, 0, 0, 255]) }, FixedDiffer { mismatch: 0.0 });

        let report = assertion.assert_screenshot("shot.png", Some(150.0)).await;
        assert!(!report.passed);
        assert!(report.message.contains("between 0 and 100"));
    }
}
