//! Non-linear least squares over a parametric curve.
//!
//! A [`CurveModel`] with an analytic gradient is adapted onto the
//! `levenberg-marquardt` solver (a MINPACK port). The covariance of the
//! solution is `s² (JᵀJ)⁻¹`, taken from the Jacobian at the converged point.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt as Minimizer, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use tracing::debug;

use crate::error::{AnalysisError, Result};

/// A parametric model `y = f(x; p)` with its gradient with respect to `p`.
pub trait CurveModel {
    fn value(&self, x: f64, params: &[f64]) -> f64;

    /// Write `∂f/∂p_j` at `x` into `grad` (same length as `params`).
    fn gradient(&self, x: f64, params: &[f64], grad: &mut [f64]);
}

/// Residuals `f(x_i; p) - y_i` of one model against one data set
pub struct CurveProblem<'a, M> {
    model: &'a M,
    x: &'a [f64],
    y: &'a [f64],
    params: DVector<f64>,
}

impl<'a, M: CurveModel> CurveProblem<'a, M> {
    pub fn new(model: &'a M, x: &'a [f64], y: &'a [f64], p0: &[f64]) -> Self {
        Self {
            model,
            x,
            y,
            params: DVector::from_column_slice(p0),
        }
    }
}

impl<M: CurveModel> LeastSquaresProblem<f64, Dyn, Dyn> for CurveProblem<'_, M> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, p: &DVector<f64>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let p = self.params.as_slice();
        Some(DVector::from_iterator(
            self.x.len(),
            self.x.iter().zip(self.y).map(|(&xi, &yi)| self.model.value(xi, p) - yi),
        ))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let p = self.params.as_slice();
        let mut jac = DMatrix::zeros(self.x.len(), p.len());
        let mut grad = vec![0.0; p.len()];
        for (i, &xi) in self.x.iter().enumerate() {
            self.model.gradient(xi, p, &mut grad);
            for (j, g) in grad.iter().enumerate() {
                jac[(i, j)] = *g;
            }
        }
        Some(jac)
    }
}

/// Converged solution of a least-squares problem
#[derive(Debug, Clone)]
pub struct CurveFit {
    pub params: Vec<f64>,
    /// `s² (JᵀJ)⁻¹`; absent when there are no degrees of freedom left or
    /// `JᵀJ` cannot be inverted at the solution
    pub covariance: Option<DMatrix<f64>>,
    pub chi_squared: f64,
    pub evaluations: usize,
}

impl CurveFit {
    /// One-sigma standard errors from the covariance diagonal
    pub fn standard_errors(&self) -> Option<Vec<f64>> {
        self.covariance
            .as_ref()
            .map(|cov| (0..cov.nrows()).map(|i| cov[(i, i)].abs().sqrt()).collect())
    }
}

/// Solver settings; `tolerance` bounds both the relative cost reduction and
/// the relative step size.
#[derive(Debug, Clone, Copy)]
pub struct LevenbergMarquardt {
    /// Function evaluations allowed per parameter (plus one)
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1.49012e-8,
        }
    }
}

impl LevenbergMarquardt {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    pub fn fit<M: CurveModel>(&self, model: &M, x: &[f64], y: &[f64], p0: &[f64]) -> Result<CurveFit> {
        if x.len() != y.len() {
            return Err(AnalysisError::LengthMismatch {
                time: x.len(),
                flux: y.len(),
                flux_error: y.len(),
            });
        }
        let n = x.len();
        let m = p0.len();
        if n < m {
            return Err(divergence(format!(
                "{} samples cannot constrain {} parameters",
                n, m
            )));
        }
        if p0.iter().any(|p| !p.is_finite()) {
            return Err(divergence("initial guess is not finite".into()));
        }

        let (problem, report) = Minimizer::new()
            .with_ftol(self.tolerance)
            .with_xtol(self.tolerance)
            .with_patience(self.max_iterations)
            .minimize(CurveProblem::new(model, x, y, p0));

        match &report.termination {
            TerminationReason::LostPatience => {
                return Err(divergence(format!(
                    "maximum number of function evaluations ({}) exceeded",
                    report.number_of_evaluations
                )));
            }
            // the tolerances cannot be met any more closely at machine precision
            TerminationReason::NoImprovementPossible(which) => {
                debug!(reason = *which, "least squares stopped at machine precision");
            }
            reason if reason.was_successful() => {}
            reason => return Err(divergence(format!("{:?}", reason))),
        }

        let params = problem.params();
        if params.iter().any(|p| !p.is_finite()) {
            return Err(divergence("solution is not finite".into()));
        }
        let chi_squared = problem
            .residuals()
            .map(|r| r.norm_squared())
            .filter(|c| c.is_finite())
            .ok_or_else(|| divergence("residuals are not finite at the solution".into()))?;

        let covariance = if n > m {
            let s_sq = chi_squared / (n - m) as f64;
            problem
                .jacobian()
                .and_then(|jac| (jac.transpose() * &jac).try_inverse())
                .filter(|inv| inv.iter().all(|v| v.is_finite()))
                .map(|inv| inv * s_sq)
        } else {
            None
        };

        debug!(
            evaluations = report.number_of_evaluations,
            chi_squared,
            "least squares converged"
        );

        Ok(CurveFit {
            params: params.iter().copied().collect(),
            covariance,
            chi_squared,
            evaluations: report.number_of_evaluations,
        })
    }
}

fn divergence(reason: String) -> AnalysisError {
    AnalysisError::FitDivergence { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use levenberg_marquardt::differentiate_numerically;

    struct Line;

    impl CurveModel for Line {
        fn value(&self, x: f64, p: &[f64]) -> f64 {
            p[0] * x + p[1]
        }

        fn gradient(&self, x: f64, _p: &[f64], grad: &mut [f64]) {
            grad[0] = x;
            grad[1] = 1.0;
        }
    }

    struct Decay;

    impl CurveModel for Decay {
        fn value(&self, x: f64, p: &[f64]) -> f64 {
            p[0] * (-p[1] * x).exp()
        }

        fn gradient(&self, x: f64, p: &[f64], grad: &mut [f64]) {
            let e = (-p[1] * x).exp();
            grad[0] = e;
            grad[1] = -p[0] * x * e;
        }
    }

    /// Second parameter never influences the output
    struct Degenerate;

    impl CurveModel for Degenerate {
        fn value(&self, x: f64, p: &[f64]) -> f64 {
            p[0] * x
        }

        fn gradient(&self, x: f64, _p: &[f64], grad: &mut [f64]) {
            grad[0] = x;
            grad[1] = 0.0;
        }
    }

    #[test]
    fn test_fits_exact_line() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.5 * v - 1.0).collect();
        let fit = LevenbergMarquardt::default()
            .fit(&Line, &x, &y, &[0.0, 0.0])
            .unwrap();
        assert_relative_eq!(fit.params[0], 2.5, epsilon = 1e-8);
        assert_relative_eq!(fit.params[1], -1.0, epsilon = 1e-8);
        assert!(fit.chi_squared < 1e-12);
    }

    #[test]
    fn test_fits_exponential_decay() {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| 3.0 * (-0.7 * v).exp()).collect();
        let fit = LevenbergMarquardt::default()
            .fit(&Decay, &x, &y, &[1.0, 0.1])
            .unwrap();
        assert_relative_eq!(fit.params[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(fit.params[1], 0.7, epsilon = 1e-6);
    }

    #[test]
    fn test_analytic_jacobian_matches_numeric() {
        let x: Vec<f64> = (0..15).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.0 * (-0.4 * v).exp()).collect();
        let mut problem = CurveProblem::new(&Decay, &x, &y, &[1.5, 0.3]);
        let numeric = differentiate_numerically(&mut problem).unwrap();
        let analytic = problem.jacobian().unwrap();
        assert_relative_eq!(numeric, analytic, epsilon = 1e-6);
    }

    #[test]
    fn test_covariance_reported_with_spare_degrees_of_freedom() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &v)| v + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let fit = LevenbergMarquardt::default()
            .fit(&Line, &x, &y, &[1.0, 0.0])
            .unwrap();
        let errors = fit.standard_errors().expect("covariance must exist");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| *e > 0.0 && e.is_finite()));
    }

    #[test]
    fn test_underdetermined_is_divergence() {
        let err = LevenbergMarquardt::default()
            .fit(&Line, &[1.0], &[2.0], &[0.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence { .. }));
    }

    #[test]
    fn test_non_finite_guess_is_divergence() {
        let err = LevenbergMarquardt::default()
            .fit(&Line, &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], &[f64::NAN, 0.0])
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence { .. }));
    }

    #[test]
    fn test_unconstrained_parameter_has_no_covariance() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.1, 5.9, 8.0];
        match LevenbergMarquardt::default().fit(&Degenerate, &x, &y, &[1.0, 1.0]) {
            Ok(fit) => assert!(fit.covariance.is_none()),
            Err(err) => assert!(matches!(err, AnalysisError::FitDivergence { .. })),
        }
    }

    #[test]
    fn test_evaluation_budget_exhausted() {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| 3.0 * (-0.7 * v).exp()).collect();
        let err = LevenbergMarquardt::new(1, 1e-15)
            .fit(&Decay, &x, &y, &[1.0, 0.1])
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence { .. }));
    }
}
