use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, trace};

use crate::diff::{DiffOptions, DiffResult, ErrorType, ImageDiffer};

/// Rows and columns divisible by this are skipped on large images
/// when anti-aliased edges are tolerated
const LARGE_IMAGE_SKIP: u32 = 6;

/// Hue distance at which two neighbours count as differently coloured
const HUE_DISTANCE: f64 = 0.3;

#[derive(Debug, Clone, Copy)]
struct Tolerance {
    channel: f64,
    alpha: f64,
    min_brightness: f64,
    max_brightness: f64,
}

const STRICT: Tolerance = Tolerance { channel: 16.0, alpha: 16.0, min_brightness: 16.0, max_brightness: 240.0 };
const ANTIALIASED: Tolerance = Tolerance { channel: 32.0, alpha: 32.0, min_brightness: 64.0, max_brightness: 96.0 };

#[derive(Debug, Clone, Copy)]
struct PixelInfo {
    r: f64,
    g: f64,
    b: f64,
    a: f64,
}

impl PixelInfo {
    fn from_rgba(pixel: &Rgba<u8>) -> Self {
        let [r, g, b, a] = pixel.0;
        Self { r: r as f64, g: g as f64, b: b as f64, a: a as f64 }
    }

    fn brightness(&self) -> f64 {
        0.3 * self.r + 0.59 * self.g + 0.11 * self.b
    }

    /// Hue in `[0, 1)`
    fn hue(&self) -> f64 {
        let (r, g, b) = (self.r / 255.0, self.g / 255.0, self.b / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        if max == min {
            return 0.0;
        }

        let d = max - min;
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        h / 6.0
    }

    fn same_rgb(&self, other: &Self) -> bool {
        self.r == other.r && self.g == other.g && self.b == other.b
    }
}

/// Clamps to a colour channel, rounding halves to even
fn to_channel(value: f64) -> u8 {
    value.round_ties_even().clamp(0.0, 255.0) as u8
}

fn similar(a: f64, b: f64, tolerance: f64) -> bool {
    a == b || (a - b).abs() < tolerance
}

/// Resemble-style pixel differ
#[derive(Debug, Clone, Default)]
pub struct PixelDiffer {
    options: DiffOptions,
}

impl PixelDiffer {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Ignoring colours switches off anti-alias handling
    fn antialias_mode(&self) -> bool {
        self.options.ignore_antialiasing && !self.options.ignore_colors
    }

    fn tolerance(&self) -> Tolerance {
        if self.antialias_mode() {
            ANTIALIASED
        } else {
            STRICT
        }
    }

    /// Compares two decoded images
    ///
    /// The compared canvas covers both images. Pixels only one image has count
    /// as mismatches.
    pub fn compare_images(&self, baseline: &RgbaImage, candidate: &RgbaImage) -> DiffResult {
        let started = Instant::now();
        let width = baseline.width().max(candidate.width());
        let height = baseline.height().max(candidate.height());
        let tolerance = self.tolerance();

        let skip = self.antialias_mode()
            && self
                .options
                .large_image_threshold
                .map_or(false, |threshold| width > threshold || height > threshold);
        if skip {
            debug!("Large image {}x{}, sampling every pixel off the {}-grid", width, height, LARGE_IMAGE_SKIP);
        }

        let mut diff_image = RgbaImage::new(width, height);
        let mut mismatch_count: u64 = 0;

        for y in 0..height {
            for x in 0..width {
                if skip && (y % LARGE_IMAGE_SKIP == 0 || x % LARGE_IMAGE_SKIP == 0) {
                    continue;
                }

                let (p1, p2) = match (baseline.get_pixel_checked(x, y), candidate.get_pixel_checked(x, y)) {
                    (Some(p1), Some(p2)) => (PixelInfo::from_rgba(p1), PixelInfo::from_rgba(p2)),
                    (Some(only), None) | (None, Some(only)) => {
                        let only = PixelInfo::from_rgba(only);
                        diff_image.put_pixel(x, y, self.error_pixel(&only));
                        mismatch_count += 1;
                        continue;
                    }
                    (None, None) => continue,
                };

                let matched = if self.options.ignore_colors {
                    self.brightness_similar(&p1, &p2, tolerance)
                } else if self.rgb_similar(&p1, &p2, tolerance) {
                    diff_image.put_pixel(x, y, self.faded_pixel(&p1));
                    continue;
                } else if self.antialias_mode()
                    && (is_antialiased(baseline, x, y, &p1, tolerance)
                        || is_antialiased(candidate, x, y, &p2, tolerance))
                {
                    self.brightness_similar(&p1, &p2, tolerance)
                } else {
                    false
                };

                if matched {
                    diff_image.put_pixel(x, y, self.grayscale_pixel(&p1));
                } else {
                    diff_image.put_pixel(x, y, self.error_pixel(&p2));
                    mismatch_count += 1;
                }
            }
        }

        let total = width as u64 * height as u64;
        let raw = if total == 0 {
            0.0
        } else {
            mismatch_count as f64 / total as f64 * 100.0
        };
        let mismatch_percentage = (raw * 100.0).round() / 100.0;
        trace!("{} of {} pixels mismatched", mismatch_count, total);

        DiffResult {
            mismatch_percentage,
            diff_image,
            same_dimensions: baseline.dimensions() == candidate.dimensions(),
            dimension_difference: (
                baseline.width() as i64 - candidate.width() as i64,
                baseline.height() as i64 - candidate.height() as i64,
            ),
            analysis_time: started.elapsed(),
        }
    }

    fn rgb_similar(&self, p1: &PixelInfo, p2: &PixelInfo, tolerance: Tolerance) -> bool {
        similar(p1.r, p2.r, tolerance.channel)
            && similar(p1.g, p2.g, tolerance.channel)
            && similar(p1.b, p2.b, tolerance.channel)
            && similar(p1.a, p2.a, tolerance.alpha)
    }

    fn brightness_similar(&self, p1: &PixelInfo, p2: &PixelInfo, tolerance: Tolerance) -> bool {
        similar(p1.a, p2.a, tolerance.alpha)
            && similar(p1.brightness(), p2.brightness(), tolerance.min_brightness)
    }

    fn faded_alpha(&self, alpha: f64) -> u8 {
        to_channel(alpha * self.options.transparency)
    }

    fn faded_pixel(&self, p: &PixelInfo) -> Rgba<u8> {
        Rgba([p.r as u8, p.g as u8, p.b as u8, self.faded_alpha(p.a)])
    }

    fn grayscale_pixel(&self, p: &PixelInfo) -> Rgba<u8> {
        let level = to_channel(p.brightness());
        Rgba([level, level, level, self.faded_alpha(p.a)])
    }

    fn error_pixel(&self, candidate: &PixelInfo) -> Rgba<u8> {
        let [er, eg, eb] = self.options.error_color;
        match self.options.error_type {
            ErrorType::Flat => Rgba([er, eg, eb, 255]),
            ErrorType::Movement => {
                let blend = |c: f64, e: u8| {
                    let e = e as f64;
                    to_channel((c * (e / 255.0) + e) / 2.0)
                };
                Rgba([
                    blend(candidate.r, er),
                    blend(candidate.g, eg),
                    blend(candidate.b, eb),
                    candidate.a as u8,
                ])
            }
        }
    }
}

/// Heuristic: does the pixel at (x, y) sit on an anti-aliased edge?
fn is_antialiased(image: &RgbaImage, x: u32, y: u32, source: &PixelInfo, tolerance: Tolerance) -> bool {
    let source_hue = source.hue();
    let source_brightness = source.brightness();
    let mut high_contrast = 0;
    let mut different_hue = 0;
    let mut equivalent = 0;

    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (nx, ny) = (x as i64 + dx, y as i64 + dy);
            if nx < 0 || ny < 0 {
                continue;
            }
            let Some(neighbour) = image.get_pixel_checked(nx as u32, ny as u32) else {
                continue;
            };
            let neighbour = PixelInfo::from_rgba(neighbour);

            if (neighbour.brightness() - source_brightness).abs() > tolerance.max_brightness {
                high_contrast += 1;
            }
            if neighbour.same_rgb(source) {
                equivalent += 1;
            }
            if (neighbour.hue() - source_hue).abs() > HUE_DISTANCE {
                different_hue += 1;
            }
            if different_hue > 1 || high_contrast > 1 {
                return true;
            }
        }
    }

    equivalent < 2
}

impl ImageDiffer for PixelDiffer {
    fn compare(&self, baseline: &Path, candidate: &Path) -> Result<DiffResult> {
        debug!("Comparing {} against {}", candidate.display(), baseline.display());
        let baseline_img = image::open(baseline)
            .with_context(|| format!("Failed to read baseline image {}", baseline.display()))?
            .to_rgba8();
        let candidate_img = image::open(candidate)
            .with_context(|| format!("Failed to read screenshot {}", candidate.display()))?
            .to_rgba8();

        let result = self.compare_images(&baseline_img, &candidate_img);
        debug!(
            "Compared in {:?}: {}% mismatch, same dimensions: {}",
            result.analysis_time, result.mismatch_percentage, result.same_dimensions
        );
        Ok(result)
    }
}
