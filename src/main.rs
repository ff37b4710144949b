use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use visual_regression::utils::logger::{init_console_logger, init_logger};
use visual_regression::{AssertionReport, PixelDiffer, ScreenshotAssertion, VisualConfig, WebDriverCapture};

#[derive(Debug, Parser)]
#[command(name = "visual-regression", version, about = "Assert browser screenshots against stored baselines")]
struct Cli {
    /// Overwrite baselines with screenshots that fail
    #[arg(short = 'u', long, global = true)]
    update_baselines: bool,

    /// Browser identifier used to partition output directories
    #[arg(short, long, global = true)]
    browser: Option<String>,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory baselines and artifacts are created under
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Write logs to a timestamped file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a page, capture it and compare it against its baseline
    Check {
        url: String,
        filename: String,
        /// Maximum accepted mismatch in percent
        #[arg(short, long)]
        tolerance: Option<f64>,
        #[arg(long)]
        webdriver: Option<String>,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },
    /// Compare a screenshot already in the positive results folder
    Compare {
        filename: String,
        #[arg(short, long)]
        tolerance: Option<f64>,
    },
}

impl Cli {
    fn resolve_config(&self) -> Result<VisualConfig> {
        let mut config = VisualConfig::load(self.config.as_deref())?;
        if self.update_baselines {
            config.update_baselines = true;
        }
        if let Some(browser) = &self.browser {
            config.browser = browser.clone();
        }
        if let Some(root) = &self.root {
            config.root_dir = root.clone();
        }

        if let Command::Check { webdriver, headed, width, height, .. } = &self.command {
            if let Some(url) = webdriver {
                config.webdriver_url = url.clone();
            }
            if *headed {
                config.headless = false;
            }
            config.viewport_width = width.unwrap_or(config.viewport_width);
            config.viewport_height = height.unwrap_or(config.viewport_height);
        }
        Ok(config)
    }
}

async fn run_check(config: VisualConfig, url: &str, filename: &str, tolerance: Option<f64>) -> Result<AssertionReport> {
    let capture = Arc::new(WebDriverCapture::from_config(&config));
    let assertion = ScreenshotAssertion::new(config, capture.clone(), Arc::new(PixelDiffer::default()))?;

    let report = match capture.navigate(url).await {
        Ok(()) => Ok(assertion.assert_screenshot(filename, tolerance).await),
        Err(e) => Err(e),
    };

    if let Err(e) = capture.close().await {
        error!("{:#}", e);
    }
    report
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.log_dir {
        Some(dir) => {
            let file = init_logger(dir)?;
            eprintln!("Logging to {}", file.display());
        }
        None => init_console_logger()?,
    }

    let config = cli.resolve_config()?;
    info!(
        "Running visual regression for {} (update baselines: {})",
        config.browser, config.update_baselines
    );

    let report = match &cli.command {
        Command::Check { url, filename, tolerance, .. } => run_check(config, url, filename, *tolerance).await?,
        Command::Compare { filename, tolerance } => {
            let assertion = ScreenshotAssertion::new(
                config.clone(),
                Arc::new(WebDriverCapture::from_config(&config)),
                Arc::new(PixelDiffer::default()),
            )?;
            assertion.compare_existing(filename, *tolerance).await
        }
    };

    let report = report.into_result()?;
    println!("{}", report.message);
    Ok(())
}
