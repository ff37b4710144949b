use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tokio::task::JoinHandle;

use crate::diff::DiffResult;

/// A screenshot to compare and the mismatch it may have
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRequest {
    pub filename: String,
    /// Maximum accepted mismatch, in percent
    pub tolerance: f64,
}

/// A comparison whose diff is still running
#[derive(Debug)]
pub struct PendingComparison {
    pub request: ComparisonRequest,
    pub baseline_path: PathBuf,
    pub result_path: PathBuf,
    /// The baseline was created from this screenshot
    pub bootstrapped: bool,
    pub(crate) handle: JoinHandle<Result<DiffResult>>,
}

/// Which side of the tolerance a screenshot landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Positive,
    Negative,
}

/// A classified comparison with the files left behind by it
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub request: ComparisonRequest,
    pub mismatch_percentage: f64,
    pub verdict: Verdict,
    pub baseline_path: PathBuf,
    /// Where the screenshot lives now: positive or negative results folder
    pub result_path: PathBuf,
    pub diff_path: PathBuf,
    pub bootstrapped: bool,
}

/// What a visual assertion reports back to the test
#[derive(Debug, Clone)]
pub struct AssertionReport {
    pub filename: String,
    pub tolerance: f64,
    /// `None` when the comparison never produced a number
    pub mismatch_percentage: Option<f64>,
    pub passed: bool,
    pub message: String,
    pub baseline_path: PathBuf,
    pub result_path: PathBuf,
    pub diff_path: Option<PathBuf>,
    pub baseline_updated: bool,
}

impl AssertionReport {
    /// Turns a failed report into an error carrying its message
    pub fn into_result(self) -> Result<Self> {
        if self.passed {
            Ok(self)
        } else {
            Err(anyhow!(self.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(passed: bool) -> AssertionReport {
        AssertionReport {
            filename: "shot.png".to_string(),
            tolerance: 0.1,
            mismatch_percentage: Some(if passed { 0.0 } else { 5.0 }),
            passed,
            message: if passed { "matched".to_string() } else { "mismatch".to_string() },
            baseline_path: PathBuf::from("baseline/shot.png"),
            result_path: PathBuf::from("result/shot.png"),
            diff_path: None,
            baseline_updated: false,
        }
    }

    #[test]
    fn test_into_result() {
        assert!(report(true).into_result().is_ok());
        let err = report(false).into_result().unwrap_err();
        assert_eq!(err.to_string(), "mismatch");
    }
}
