use crate::data_access::LightCurveSeries;
use crate::error::{AnalysisError, Result};

/// Extended phase range shown in phase diagrams
pub const EXTENDED_PHASE_RANGE: (f64, f64) = (-0.25, 1.25);

/// `((t - epoch) / period) mod 1`, always in `[0, 1)`.
pub fn phase_fold(time: &[f64], epoch: f64, period: f64) -> Result<Vec<f64>> {
    if period == 0.0 {
        return Err(AnalysisError::DivisionByZero);
    }
    let phases = time
        .iter()
        .map(|t| {
            let phase = ((t - epoch) / period).rem_euclid(1.0);
            // rem_euclid rounds tiny negatives up to exactly 1.0
            if phase >= 1.0 {
                0.0
            } else {
                phase
            }
        })
        .collect();
    Ok(phases)
}

/// Phase diagram data: the folded phase plus a copy shifted by -1 and +1,
/// clipped to [`EXTENDED_PHASE_RANGE`] so the curve wraps without a seam.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseCurve {
    pub phase: Vec<f64>,
    pub extended_phase: Vec<f64>,
    pub extended_flux: Vec<f64>,
}

pub fn extend_phase(phase: &[f64], flux: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let (lo, hi) = EXTENDED_PHASE_RANGE;
    let mut extended_phase = Vec::new();
    let mut extended_flux = Vec::new();
    for shift in [-1.0, 0.0, 1.0] {
        for (p, f) in phase.iter().zip(flux) {
            let shifted = p + shift;
            if shifted >= lo && shifted <= hi {
                extended_phase.push(shifted);
                extended_flux.push(*f);
            }
        }
    }
    (extended_phase, extended_flux)
}

pub fn fold_series(series: &LightCurveSeries, epoch: f64, period: f64) -> Result<PhaseCurve> {
    let phase = phase_fold(series.time(), epoch, period)?;
    let (extended_phase, extended_flux) = extend_phase(&phase, series.flux());
    Ok(PhaseCurve {
        phase,
        extended_phase,
        extended_flux,
    })
}
