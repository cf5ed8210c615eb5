//! Gaussian fit to a flux minimum inside a time window.

use nalgebra::Matrix4;
use tracing::{debug, warn};

use crate::data_access::LightCurveSeries;
use crate::error::{AnalysisError, Result};
use crate::statistical_methods::least_squares::{CurveModel, LevenbergMarquardt};
use crate::statistical_methods::statistics::{argmin, median};
use crate::timing::TimeWindow;

/// Samples needed to constrain the four Gaussian parameters
pub const MIN_SAMPLES: usize = 4;

/// `f(t) = A exp(-0.5 ((t - mu) / sigma)^2) + offset`,
/// parameters ordered `[A, mu, sigma, offset]`.
pub struct GaussianDip;

impl CurveModel for GaussianDip {
    fn value(&self, t: f64, p: &[f64]) -> f64 {
        let z = (t - p[1]) / p[2];
        p[0] * (-0.5 * z * z).exp() + p[3]
    }

    fn gradient(&self, t: f64, p: &[f64], grad: &mut [f64]) {
        let z = (t - p[1]) / p[2];
        let g = (-0.5 * z * z).exp();
        grad[0] = g;
        grad[1] = p[0] * g * z / p[2];
        grad[2] = p[0] * g * z * z / p[2];
        grad[3] = 1.0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianFitResult {
    /// Dip depth, negative for a minimum
    pub amplitude: f64,
    /// Time of minimum
    pub center: f64,
    pub sigma: f64,
    /// Baseline flux
    pub offset: f64,
    /// Parameter covariance in `[A, mu, sigma, offset]` order
    pub covariance: Option<Matrix4<f64>>,
}

impl GaussianFitResult {
    pub fn evaluate(&self, t: f64) -> f64 {
        GaussianDip.value(t, &self.params())
    }

    pub fn params(&self) -> [f64; 4] {
        [self.amplitude, self.center, self.sigma, self.offset]
    }

    pub fn standard_errors(&self) -> Option<[f64; 4]> {
        let cov = self.covariance.as_ref()?;
        Some([0usize, 1, 2, 3].map(|i| cov[(i, i)].abs().sqrt()))
    }

    pub fn center_error(&self) -> Option<f64> {
        self.standard_errors().map(|e| e[1])
    }
}

/// Starting point for the solver: dip depth against the median, deepest
/// sample as center, a sixth of the window span as width.
pub fn initial_guess(window: &LightCurveSeries) -> Result<[f64; 4]> {
    let (idx_min, flux_min) = argmin(window.flux()).ok_or_else(|| AnalysisError::FitDivergence {
        reason: "window contains no finite flux".into(),
    })?;
    let offset0 = median(window.flux()).unwrap_or(flux_min);
    let time = window.time();
    let sigma0 = (time[time.len() - 1] - time[0]) / 6.0;
    Ok([flux_min - offset0, time[idx_min], sigma0, offset0])
}

/// The model only sees sigma squared, so a negative sigma is the same curve as
/// its absolute value. Returns `|sigma|` and flips the sign of the sigma
/// cross terms so the covariance describes the reported parameters.
fn normalize_sigma(sigma: f64, covariance: Option<&mut Matrix4<f64>>) -> f64 {
    if sigma >= 0.0 {
        return sigma;
    }
    warn!(sigma, "fit converged to a negative sigma, using its absolute value");
    if let Some(cov) = covariance {
        for j in 0..4 {
            if j != 2 {
                cov[(2, j)] = -cov[(2, j)];
                cov[(j, 2)] = -cov[(j, 2)];
            }
        }
    }
    -sigma
}

pub fn fit_minimum(
    series: &LightCurveSeries,
    window: TimeWindow,
    solver: &LevenbergMarquardt,
) -> Result<GaussianFitResult> {
    let selected = series.select(window.start(), window.end());
    if selected.len() < MIN_SAMPLES {
        return Err(AnalysisError::FitDivergence {
            reason: format!(
                "window {} holds {} samples, need at least {}",
                window,
                selected.len(),
                MIN_SAMPLES
            ),
        });
    }

    let p0 = initial_guess(&selected)?;
    let fit = solver.fit(&GaussianDip, selected.time(), selected.flux(), &p0)?;

    let mut covariance = fit
        .covariance
        .as_ref()
        .map(|cov| Matrix4::from_column_slice(cov.as_slice()));

    let sigma = normalize_sigma(fit.params[2], covariance.as_mut());

    let result = GaussianFitResult {
        amplitude: fit.params[0],
        center: fit.params[1],
        sigma,
        offset: fit.params[3],
        covariance,
    };
    debug!(
        window = %window,
        center = result.center,
        amplitude = result.amplitude,
        sigma = result.sigma,
        "fitted minimum"
    );
    Ok(result)
}
