use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use chrono::Local;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Path of the log file a run started now would write to
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    log_dir.join(format!("visual_regression_{}.log", timestamp))
}

/// Sends all tracing output to a timestamped file in `log_dir`
pub fn init_logger(log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let log_file = log_file_path(log_dir);
    let writer = fs::File::create(&log_file)
        .with_context(|| format!("Failed to create log file: {}", log_file.display()))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter())
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    info!("Logger initialized");

    Ok(log_file)
}

/// Sends tracing output to stderr
pub fn init_console_logger() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
