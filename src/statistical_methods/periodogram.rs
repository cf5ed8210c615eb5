//! Lomb–Scargle periodogram for unevenly sampled light curves.
//!
//! Power uses the standard normalization, `(YC²/CC + YS²/SS) / YY` on
//! mean-subtracted flux, so a pure sinusoid peaks at 1.
//!
//! Small problems are summed directly. Once samples times frequencies
//! exceeds [`DIRECT_LIMIT`] the trigonometric sums are evaluated with the
//! Press & Rybicki method: samples are extirpolated onto a regular grid and
//! one inverse FFT yields the sums at every frequency.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::statistical_methods::statistics::{mean, median_cadence};

#[derive(Debug, Clone)]
pub struct Periodogram {
    /// Frequencies in cycles per day
    pub frequency: Vec<f64>,
    pub power: Vec<f64>,
}

impl Periodogram {
    /// Frequency and power of the highest peak
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequency
            .iter()
            .copied()
            .zip(self.power.iter().copied())
            .filter(|(_, p)| p.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn frequency_at_max_power(&self) -> Option<f64> {
        self.peak().map(|(f, _)| f)
    }

    pub fn period_at_max_power(&self) -> Option<f64> {
        self.frequency_at_max_power().map(|f| 1.0 / f)
    }

    /// Periods in days, one per frequency
    pub fn period(&self) -> Vec<f64> {
        self.frequency.iter().map(|f| 1.0 / f).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LombScargle {
    pub oversample_factor: f64,
    /// Upper frequency bound; defaults to the Nyquist frequency of the median cadence
    pub max_frequency: Option<f64>,
}

impl Default for LombScargle {
    fn default() -> Self {
        Self {
            oversample_factor: 1.0,
            max_frequency: None,
        }
    }
}

impl LombScargle {
    pub fn new(oversample_factor: f64, max_frequency: Option<f64>) -> Self {
        Self {
            oversample_factor,
            max_frequency,
        }
    }

    /// Evenly spaced grid from `fs` to the upper bound, with
    /// `fs = 1 / (oversample_factor * baseline)`.
    pub fn frequency_grid(&self, time: &[f64]) -> Result<Vec<f64>> {
        if time.len() < 3 {
            return Err(AnalysisError::InsufficientData {
                needed: 3,
                got: time.len(),
            });
        }
        let (t_min, t_max) = time
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
        let baseline = t_max - t_min;
        if !(baseline > 0.0) {
            return Err(AnalysisError::InsufficientData {
                needed: 2,
                got: 1,
            });
        }
        let fs = 1.0 / (self.oversample_factor * baseline);

        let nyquist = match median_cadence(time) {
            Some(dt) => 0.5 / dt,
            None => 0.5 * (time.len() - 1) as f64 / baseline,
        };
        let f_max = self.max_frequency.unwrap_or(nyquist);
        if !(f_max >= fs) {
            return Err(AnalysisError::InvalidFrequencyRange { min: fs, max: f_max });
        }

        let n = ((f_max - fs) / fs).floor() as usize + 1;
        Ok((0..n).map(|i| fs + i as f64 * fs).collect())
    }

    pub fn compute(&self, time: &[f64], flux: &[f64]) -> Result<Periodogram> {
        if time.len() != flux.len() {
            return Err(AnalysisError::LengthMismatch {
                time: time.len(),
                flux: flux.len(),
                flux_error: flux.len(),
            });
        }
        let frequency = self.frequency_grid(time)?;

        let t0 = time[0];
        let t: Vec<f64> = time.iter().map(|v| v - t0).collect();
        let y_mean = mean(flux).unwrap_or(0.0);
        let y: Vec<f64> = flux.iter().map(|v| v - y_mean).collect();
        let yy: f64 = y.iter().map(|v| v * v).sum();

        let power = if yy == 0.0 {
            vec![0.0; frequency.len()]
        } else if t.len().saturating_mul(frequency.len()) <= DIRECT_LIMIT || frequency.len() < 2 {
            frequency
                .iter()
                .map(|&f| lomb_scargle_power(&t, &y, yy, 2.0 * PI * f))
                .collect()
        } else {
            debug!(
                samples = t.len(),
                frequencies = frequency.len(),
                "evaluating periodogram with FFT sums"
            );
            fast_power(&t, &y, yy, frequency[0], frequency[1] - frequency[0], frequency.len())
        };

        Ok(Periodogram { frequency, power })
    }
}

/// Samples times frequencies summed directly before switching to FFT sums
pub const DIRECT_LIMIT: usize = 10_000_000;

/// FFT grid points per output frequency
const FFT_OVERSAMPLING: usize = 5;

/// Grid nodes each sample is spread over
const EXTIRPOLATION_ORDER: usize = 4;

fn normalized_power(yc: f64, ys: f64, cc: f64, ss: f64, yy: f64) -> f64 {
    let mut p = 0.0;
    if cc > f64::EPSILON {
        p += yc * yc / cc;
    }
    if ss > f64::EPSILON {
        p += ys * ys / ss;
    }
    p / yy
}

fn lomb_scargle_power(t: &[f64], y: &[f64], yy: f64, omega: f64) -> f64 {
    let (s2, c2) = t.iter().fold((0.0, 0.0), |(s, c), &ti| {
        let (sin, cos) = (2.0 * omega * ti).sin_cos();
        (s + sin, c + cos)
    });
    let tau = s2.atan2(c2) / (2.0 * omega);

    let mut yc = 0.0;
    let mut ys = 0.0;
    let mut cc = 0.0;
    let mut ss = 0.0;
    for (&ti, &yi) in t.iter().zip(y) {
        let (sin, cos) = (omega * (ti - tau)).sin_cos();
        yc += yi * cos;
        ys += yi * sin;
        cc += cos * cos;
        ss += sin * sin;
    }
    normalized_power(yc, ys, cc, ss, yy)
}

/// Power on the grid `f0 + k * df`, `k < m`, from FFT-evaluated sums.
fn fast_power(t: &[f64], y: &[f64], yy: f64, f0: f64, df: f64, m: usize) -> Vec<f64> {
    let mut planner = FftPlanner::new();
    let ones = vec![1.0; t.len()];
    let sums_y = trig_sums(&mut planner, t, y, f0, df, m);
    let sums_2 = trig_sums(&mut planner, t, &ones, 2.0 * f0, 2.0 * df, m);
    let n = t.len() as f64;

    sums_y
        .iter()
        .zip(&sums_2)
        .map(|(sy, s2)| {
            // omega * tau
            let (sin_t, cos_t) = (0.5 * s2.im.atan2(s2.re)).sin_cos();
            let yc = sy.re * cos_t + sy.im * sin_t;
            let ys = sy.im * cos_t - sy.re * sin_t;
            let spread = s2.norm();
            normalized_power(yc, ys, 0.5 * (n + spread), 0.5 * (n - spread), yy)
        })
        .collect()
}

/// `Σ h_j exp(2πi (f0 + k df) t_j)` for `k < m`; the real part is the
/// cosine sum and the imaginary part the sine sum.
fn trig_sums(
    planner: &mut FftPlanner<f64>,
    t: &[f64],
    h: &[f64],
    f0: f64,
    df: f64,
    m: usize,
) -> Vec<Complex64> {
    let nfft = (m * FFT_OVERSAMPLING).next_power_of_two();
    let mut grid = vec![Complex64::new(0.0, 0.0); nfft];
    for (&ti, &hi) in t.iter().zip(h) {
        let weight = Complex64::from_polar(hi, 2.0 * PI * f0 * ti);
        let x = (ti * df * nfft as f64).rem_euclid(nfft as f64);
        extirpolate(&mut grid, x, weight);
    }
    planner.plan_fft_inverse(nfft).process(&mut grid);
    grid.truncate(m);
    grid
}

/// Spread `value` at fractional position `x` over the surrounding grid
/// nodes with Lagrange weights. The grid is periodic in its length.
fn extirpolate(grid: &mut [Complex64], x: f64, value: Complex64) {
    let len = grid.len() as i64;
    let first = x.floor() as i64 - (EXTIRPOLATION_ORDER as i64 / 2 - 1);
    for j in 0..EXTIRPOLATION_ORDER {
        let mut weight = 1.0;
        for k in (0..EXTIRPOLATION_ORDER).filter(|&k| k != j) {
            weight *= (x - (first + k as i64) as f64) / (j as f64 - k as f64);
        }
        let node = (first + j as i64).rem_euclid(len) as usize;
        grid[node] += value * weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_recovers_sinusoid_period() {
        let time: Vec<f64> = (0..1500).map(|i| 1325.0 + i as f64 * 0.02).collect();
        let flux: Vec<f64> = time
            .iter()
            .map(|t| 1.0 + 0.01 * (2.0 * PI * t / 3.0).sin())
            .collect();

        let pg = LombScargle::default().compute(&time, &flux).unwrap();
        let period = pg.period_at_max_power().unwrap();
        assert_relative_eq!(period, 3.0, epsilon = 0.05);

        let (_, peak_power) = pg.peak().unwrap();
        assert!(peak_power > 0.9 && peak_power <= 1.0 + 1e-9);
    }

    #[test]
    fn test_grid_spacing_and_nyquist() {
        let time: Vec<f64> = (0..101).map(|i| i as f64 * 0.1).collect();
        let grid = LombScargle::default().frequency_grid(&time).unwrap();
        // baseline 10 d, fs = 0.1 / d, nyquist = 5 / d
        assert_relative_eq!(grid[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(grid[1] - grid[0], 0.1, epsilon = 1e-12);
        assert!(*grid.last().unwrap() <= 5.0 + 1e-9);

        let finer = LombScargle::new(5.0, Some(1.0)).frequency_grid(&time).unwrap();
        assert_relative_eq!(finer[1] - finer[0], 0.02, epsilon = 1e-12);
        assert!(*finer.last().unwrap() <= 1.0 + 1e-9);
    }

    #[test]
    fn test_flat_flux_has_zero_power() {
        let time: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let flux = vec![1.0; 50];
        let pg = LombScargle::default().compute(&time, &flux).unwrap();
        assert!(pg.power.iter().all(|p| *p == 0.0));
    }

    #[test]
    fn test_upper_bound_below_resolution_is_error() {
        let time: Vec<f64> = (0..21).map(|i| i as f64 * 0.1).collect();
        // baseline 2 d puts the first grid frequency at 0.5 / d
        let err = LombScargle::new(1.0, Some(0.1)).frequency_grid(&time).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidFrequencyRange { .. }));

        let flux = vec![1.0; time.len()];
        let err = LombScargle::new(1.0, Some(0.1)).compute(&time, &flux).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidFrequencyRange { .. }));
    }

    #[test]
    fn test_fft_sums_match_direct_sums() {
        let time: Vec<f64> = (0..2000)
            .map(|i| i as f64 * 0.02 + 0.005 * (i as f64 * 0.7).sin())
            .collect();
        let y: Vec<f64> = time
            .iter()
            .map(|t| (2.0 * PI * t / 3.0).sin() + 0.3 * (2.0 * PI * t / 0.7).cos())
            .collect();
        let yy: f64 = y.iter().map(|v| v * v).sum();
        let grid = LombScargle::default().frequency_grid(&time).unwrap();

        let direct: Vec<f64> = grid
            .iter()
            .map(|&f| lomb_scargle_power(&time, &y, yy, 2.0 * PI * f))
            .collect();
        let fast = fast_power(&time, &y, yy, grid[0], grid[1] - grid[0], grid.len());

        assert_eq!(fast.len(), direct.len());
        for (a, b) in fast.iter().zip(&direct) {
            assert!((a - b).abs() < 1e-2, "fast {} direct {}", a, b);
        }
        let argmax = |p: &[f64]| {
            p.iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
        };
        assert_eq!(argmax(&fast), argmax(&direct));
    }

    #[test]
    fn test_large_baseline_uses_fft_sums() {
        // two 50-day blocks 100 days apart at 7.2-minute cadence
        let time: Vec<f64> = (0..10_000)
            .map(|i| i as f64 * 0.005)
            .chain((0..10_000).map(|i| 150.0 + i as f64 * 0.005))
            .collect();
        let flux: Vec<f64> = time
            .iter()
            .map(|t| 1.0 + 0.02 * (2.0 * PI * t / 2.5).sin())
            .collect();

        let ls = LombScargle::default();
        let grid = ls.frequency_grid(&time).unwrap();
        assert!(time.len() * grid.len() > DIRECT_LIMIT);

        let pg = ls.compute(&time, &flux).unwrap();
        assert_relative_eq!(pg.period_at_max_power().unwrap(), 2.5, epsilon = 0.05);
    }

    #[test]
    fn test_extirpolation_keeps_integer_positions_on_one_node() {
        let mut grid = vec![Complex64::new(0.0, 0.0); 16];
        extirpolate(&mut grid, 5.0, Complex64::new(2.0, 0.0));
        assert_relative_eq!(grid[5].re, 2.0, epsilon = 1e-12);
        assert!(grid.iter().enumerate().all(|(i, v)| i == 5 || v.norm() < 1e-12));

        // weights near the end wrap to the start of the grid
        let mut grid = vec![Complex64::new(0.0, 0.0); 16];
        extirpolate(&mut grid, 15.5, Complex64::new(1.0, 0.0));
        let total: f64 = grid.iter().map(|v| v.re).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert!(grid[0].re.abs() > 0.0 && grid[1].re.abs() > 0.0);
    }

    #[test]
    fn test_too_few_samples() {
        let err = LombScargle::default().compute(&[1.0, 2.0], &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }
}
