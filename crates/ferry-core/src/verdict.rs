//! Ternary verdict for a whole run, computed from outcome counts.

use std::fmt;

use thiserror::Error;

use crate::orchestrator::RunResult;

const BASIS_POINTS: u64 = 10_000;

/// Overall verdict of a bulk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// Enough items made it to call the run usable, but not all of them.
    DegradedSuccess,
    Failure,
}

impl Verdict {
    /// Process exit code: 0 for Success and DegradedSuccess, 1 for Failure.
    pub fn exit_code(self) -> i32 {
        match self {
            Verdict::Success | Verdict::DegradedSuccess => 0,
            Verdict::Failure => 1,
        }
    }

    pub fn is_failure(self) -> bool {
        self == Verdict::Failure
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success => write!(f, "success"),
            Verdict::DegradedSuccess => write!(f, "degraded success"),
            Verdict::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid verdict thresholds: need 0 < degraded ({degraded}) <= success ({success}) <= 1")]
pub struct InvalidThresholds {
    pub success: f64,
    pub degraded: f64,
}

/// Success-rate thresholds, stored as basis points so comparisons are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerdictThresholds {
    success_bp: u64,
    degraded_bp: u64,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            success_bp: 9_000,
            degraded_bp: 7_000,
        }
    }
}

impl VerdictThresholds {
    /// Rates in (0, 1]; rounded to the nearest basis point.
    pub fn new(success_rate: f64, degraded_rate: f64) -> Result<Self, InvalidThresholds> {
        let valid = degraded_rate > 0.0 && degraded_rate <= success_rate && success_rate <= 1.0;
        if !valid || !success_rate.is_finite() || !degraded_rate.is_finite() {
            return Err(InvalidThresholds {
                success: success_rate,
                degraded: degraded_rate,
            });
        }
        Ok(Self {
            success_bp: to_basis_points(success_rate),
            degraded_bp: to_basis_points(degraded_rate).max(1),
        })
    }

    pub fn success_rate(&self) -> f64 {
        self.success_bp as f64 / BASIS_POINTS as f64
    }

    pub fn degraded_rate(&self) -> f64 {
        self.degraded_bp as f64 / BASIS_POINTS as f64
    }
}

fn to_basis_points(rate: f64) -> u64 {
    (rate * BASIS_POINTS as f64).round() as u64
}

/// Maps run counts to a verdict.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    thresholds: VerdictThresholds,
    /// Any failed or corrupted item fails the run.
    strict: bool,
}

impl Classifier {
    pub fn new(thresholds: VerdictThresholds) -> Self {
        Self {
            thresholds,
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn thresholds(&self) -> VerdictThresholds {
        self.thresholds
    }

    pub fn classify(&self, result: &RunResult) -> Verdict {
        self.classify_counts(result.successful, result.failed, result.corrupted)
    }

    pub fn classify_counts(&self, successful: usize, failed: usize, corrupted: usize) -> Verdict {
        let total = (successful + failed + corrupted) as u64;
        let successful = successful as u64;
        if total == 0 || successful == 0 {
            return Verdict::Failure;
        }
        if self.strict {
            return if successful == total {
                Verdict::Success
            } else {
                Verdict::Failure
            };
        }
        let scaled = successful * BASIS_POINTS;
        if scaled >= self.thresholds.success_bp * total {
            Verdict::Success
        } else if scaled >= self.thresholds.degraded_bp * total {
            Verdict::DegradedSuccess
        } else {
            Verdict::Failure
        }
    }
}
