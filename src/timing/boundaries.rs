//! Ingress and egress from a fractional-depth threshold.

use crate::data_access::LightCurveSeries;
use crate::error::{AnalysisError, Result};
use crate::statistical_methods::statistics::{mean, median};
use crate::timing::TimeWindow;

/// Samples earlier than this many days before the window's mean time form
/// the out-of-transit baseline.
const BASELINE_LEAD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitBoundaries {
    pub ingress: f64,
    pub egress: f64,
    pub baseline: f64,
    pub depth: f64,
    pub threshold: f64,
}

impl TransitBoundaries {
    pub fn duration(&self) -> f64 {
        self.egress - self.ingress
    }
}

/// First and last samples of `window` whose flux drops below
/// `baseline - frac_depth * depth`.
pub fn detect_boundaries(
    series: &LightCurveSeries,
    window: TimeWindow,
    frac_depth: f64,
) -> Result<TransitBoundaries> {
    let no_transit = AnalysisError::NoTransitDetected {
        start: window.start(),
        end: window.end(),
    };

    let selected = series.select(window.start(), window.end());
    let time = selected.time();
    let flux = selected.flux();
    let Some(t_mean) = mean(time) else {
        return Err(no_transit);
    };

    let before: Vec<f64> = time
        .iter()
        .zip(flux)
        .filter(|(t, _)| **t < t_mean - BASELINE_LEAD)
        .map(|(_, f)| *f)
        .collect();
    let Some(baseline) = median(&before) else {
        return Err(no_transit);
    };

    let flux_min = flux.iter().copied().fold(f64::INFINITY, f64::min);
    let depth = baseline - flux_min;
    let threshold = baseline - frac_depth * depth;

    let mut in_transit = time.iter().zip(flux).filter(|(_, f)| **f < threshold).map(|(t, _)| *t);
    let Some(ingress) = in_transit.next() else {
        return Err(no_transit);
    };
    let egress = in_transit.last().unwrap_or(ingress);

    Ok(TransitBoundaries {
        ingress,
        egress,
        baseline,
        depth,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_with(f: impl Fn(f64) -> f64) -> LightCurveSeries {
        let time: Vec<f64> = (0..=200).map(|i| i as f64 * 0.01).collect();
        let flux: Vec<f64> = time.iter().map(|&t| f(t)).collect();
        let n = time.len();
        LightCurveSeries::new(time, flux, vec![0.001; n]).unwrap()
    }

    #[test]
    fn test_boundaries_bracket_the_dip() {
        let series = series_with(|t| 1.0 - 0.1 * (-0.5 * ((t - 1.2) / 0.05f64).powi(2)).exp());
        let window = TimeWindow::new(0.0, 2.0).unwrap();
        let b = detect_boundaries(&series, window, 0.06).unwrap();

        assert!((b.baseline - 1.0).abs() < 1e-6);
        assert!((b.depth - 0.1).abs() < 1e-6);
        assert!(b.ingress > 1.07 && b.ingress < 1.10, "ingress {}", b.ingress);
        assert!(b.egress > 1.30 && b.egress < 1.33, "egress {}", b.egress);
        assert!(b.ingress < 1.2 && 1.2 < b.egress);
        assert!(b.duration() > 0.0);
    }

    #[test]
    fn test_flat_window_reports_no_transit() {
        let series = series_with(|_| 1.0);
        let window = TimeWindow::new(0.0, 2.0).unwrap();
        let err = detect_boundaries(&series, window, 0.06).unwrap_err();
        assert!(matches!(err, AnalysisError::NoTransitDetected { .. }));
    }

    #[test]
    fn test_window_without_baseline_reports_no_transit() {
        let series = series_with(|t| 1.0 - 0.01 * t);
        let window = TimeWindow::new(5.0, 6.0).unwrap();
        let err = detect_boundaries(&series, window, 0.06).unwrap_err();
        assert!(matches!(err, AnalysisError::NoTransitDetected { .. }));
    }
}
