//! Visual regression assertions for browser end-to-end tests.
//!
//! A screenshot is captured into a "positive" results folder, compared against
//! a stored baseline, and classified by a mismatch tolerance. Failing
//! screenshots are moved into a "negative" folder next to a diff image so they
//! can be inspected or promoted to the new baseline.

pub mod assertion;
pub mod capture;
pub mod config;
pub mod diff;
pub mod layout;
pub mod utils;

pub use crate::assertion::{
    AssertionReport, ComparisonOutcome, ComparisonRequest, PendingComparison, ScreenshotAssertion, Verdict,
};
pub use crate::capture::{ScreenshotDriver, WebDriverCapture};
pub use crate::config::VisualConfig;
pub use crate::diff::{DiffOptions, DiffResult, ErrorType, ImageDiffer, PixelDiffer};
pub use crate::layout::DirectoryLayout;
