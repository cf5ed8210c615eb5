//! Eclipse and transit timing: minimum fits, boundaries, period and phase.

pub mod boundaries;
pub mod minimum_fit;
pub mod period;
pub mod phase;

use std::fmt::Display;

use crate::error::{AnalysisError, Result};

pub use boundaries::{detect_boundaries, TransitBoundaries};
pub use minimum_fit::{fit_minimum, GaussianDip, GaussianFitResult};
pub use period::{period_from_minima, PeriodEstimate};
pub use phase::{fold_series, phase_fold, PhaseCurve};

/// Inclusive time interval `[start, end]` with `start < end`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    start: f64,
    end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Result<TimeWindow> {
        if !(start.is_finite() && end.is_finite() && start < end) {
            return Err(AnalysisError::InvalidWindow { start, end });
        }
        Ok(TimeWindow { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

impl Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{:.4}, {:.4}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_validation() {
        assert!(TimeWindow::new(1.0, 2.0).is_ok());
        assert!(matches!(
            TimeWindow::new(2.0, 1.0),
            Err(AnalysisError::InvalidWindow { .. })
        ));
        assert!(TimeWindow::new(1.0, 1.0).is_err());
        assert!(TimeWindow::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_window_is_inclusive() {
        let w = TimeWindow::new(1.0, 2.0).unwrap();
        assert!(w.contains(1.0));
        assert!(w.contains(2.0));
        assert!(!w.contains(2.000001));
    }
}
