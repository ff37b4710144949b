//! Pixel comparison between a baseline and a candidate screenshot

pub mod pixel;

use anyhow::Result;
use image::RgbaImage;
use std::path::Path;
use std::time::Duration;

pub use pixel::PixelDiffer;

/// How mismatching pixels are painted in the diff image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Solid error colour
    Flat,
    /// Candidate pixel blended towards the error colour, so moved content stays recognisable
    Movement,
}

/// Output and matching settings for a comparison
#[derive(Debug, Clone, PartialEq)]
pub struct DiffOptions {
    pub error_color: [u8; 3],
    pub error_type: ErrorType,
    /// Alpha multiplier for pixels that matched
    pub transparency: f64,
    /// Above this width or height the comparison samples instead of visiting every pixel
    pub large_image_threshold: Option<u32>,
    pub ignore_antialiasing: bool,
    pub ignore_colors: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            error_color: [225, 0, 255],
            error_type: ErrorType::Movement,
            transparency: 0.1,
            large_image_threshold: Some(1200),
            ignore_antialiasing: true,
            ignore_colors: true,
        }
    }
}

/// Result of comparing two images
#[derive(Debug, Clone)]
pub struct DiffResult {
    /// Share of mismatching pixels in percent, rounded to two decimals
    pub mismatch_percentage: f64,
    pub diff_image: RgbaImage,
    pub same_dimensions: bool,
    /// Baseline size minus candidate size, as (width, height)
    pub dimension_difference: (i64, i64),
    pub analysis_time: Duration,
}

/// A pixel-diff capability
///
/// Comparisons are CPU bound and run on the blocking thread pool.
pub trait ImageDiffer: Send + Sync {
    fn compare(&self, baseline: &Path, candidate: &Path) -> Result<DiffResult>;
}
