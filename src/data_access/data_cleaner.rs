use tracing::{debug, warn};

use crate::data_access::{LightCurveSeries, RawLightCurve};
use crate::error::{AnalysisError, Result};
use crate::statistical_methods::statistics::{median, median_absolute_deviation};

/// Scale factor from MAD to a Gaussian standard deviation
const MAD_TO_SIGMA: f64 = 1.4826;

/// Drop flagged and non-finite samples, then sort by time.
pub fn filter_and_sort(raw: RawLightCurve, quality_bitmask: i32) -> LightCurveSeries {
    let RawLightCurve {
        time,
        flux,
        flux_error,
        quality,
    } = raw;

    let n = time.len().min(flux.len()).min(flux_error.len());
    let mut kept: Vec<(f64, f64, f64)> = (0..n)
        .filter(|&i| {
            quality.get(i).map_or(true, |q| (q & quality_bitmask) == 0)
                && time[i].is_finite()
                && flux[i].is_finite()
                && flux_error[i].is_finite()
        })
        .map(|i| (time[i], flux[i], flux_error[i]))
        .collect();

    kept.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut series = LightCurveSeries::default();
    for (t, f, e) in kept {
        series.extend_one(t, f, e);
    }
    series
}

/// Divide flux and its uncertainty by the median flux.
pub fn normalize(series: &LightCurveSeries) -> Result<LightCurveSeries> {
    let med = median(series.flux())
        .ok_or_else(|| AnalysisError::InvalidFlux("no finite flux to normalize".into()))?;
    if !med.is_finite() || med == 0.0 {
        return Err(AnalysisError::InvalidFlux(format!(
            "median flux {} cannot be used for normalization",
            med
        )));
    }
    let inv = 1.0 / med;
    LightCurveSeries::new(
        series.time().to_vec(),
        series.flux().iter().map(|&f| f * inv).collect(),
        series.flux_error().iter().map(|&e| e * inv.abs()).collect(),
    )
}

/// Drop samples more than `k` sigma above the median. Only bright outliers are
/// removed so eclipses survive the clip.
pub fn clip_upper_outliers(series: &LightCurveSeries, k: f64) -> LightCurveSeries {
    let (Some(med), Some(mad)) = (median(series.flux()), median_absolute_deviation(series.flux()))
    else {
        return series.clone();
    };
    let threshold = med + k * MAD_TO_SIGMA * mad;

    let mut out = LightCurveSeries::default();
    for i in 0..series.len() {
        if series.flux()[i] <= threshold {
            out.extend_one(series.time()[i], series.flux()[i], series.flux_error()[i]);
        }
    }
    let removed = series.len() - out.len();
    if removed > 0 {
        debug!(removed, threshold, "clipped upper outliers");
    }
    out
}

/// Clean, normalize and stitch sectors together in the order given.
pub fn clean_and_concatenate(
    sectors: Vec<RawLightCurve>,
    quality_bitmask: i32,
    clip_sigma: Option<f64>,
) -> Result<LightCurveSeries> {
    if sectors.is_empty() {
        return Err(AnalysisError::EmptySelection);
    }

    let mut out = LightCurveSeries::default();
    for (index, raw) in sectors.into_iter().enumerate() {
        let raw_len = raw.time.len();
        let cleaned = filter_and_sort(raw, quality_bitmask);
        if cleaned.is_empty() {
            warn!(sector = index, "no usable samples after cleaning, skipping");
            continue;
        }
        let mut normalized = normalize(&cleaned)?;
        if let Some(k) = clip_sigma {
            normalized = clip_upper_outliers(&normalized, k);
        }
        debug!(
            sector = index,
            raw = raw_len,
            kept = normalized.len(),
            "cleaned sector"
        );
        out.extend(normalized);
    }
    Ok(out)
}
