use crate::data_access::LightCurveSeries;
use crate::error::Result;
use crate::statistical_methods::least_squares::LevenbergMarquardt;
use crate::timing::minimum_fit::{fit_minimum, GaussianFitResult};
use crate::timing::TimeWindow;

/// Orbital period from two fitted minima of the same type
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodEstimate {
    pub first: GaussianFitResult,
    pub second: GaussianFitResult,
    /// `second.center - first.center`; negative when the windows are given
    /// in reverse chronological order
    pub period: f64,
}

impl PeriodEstimate {
    /// Standard error of the period when both fits carry a covariance
    pub fn period_error(&self) -> Option<f64> {
        let a = self.first.center_error()?;
        let b = self.second.center_error()?;
        Some((a * a + b * b).sqrt())
    }
}

/// Fit both windows and take the separation of the two centers. Both windows
/// must bracket minima of the same type (primary or secondary).
pub fn period_from_minima(
    series: &LightCurveSeries,
    first: TimeWindow,
    second: TimeWindow,
    solver: &LevenbergMarquardt,
) -> Result<PeriodEstimate> {
    let first = fit_minimum(series, first, solver)?;
    let second = fit_minimum(series, second, solver)?;
    let period = second.center - first.center;
    Ok(PeriodEstimate {
        first,
        second,
        period,
    })
}
