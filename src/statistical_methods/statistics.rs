/// Median of the finite values in `data`.
pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    // Filter out NaNs so they don't break ordering
    let mut v: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;

    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) * 0.5)
    } else {
        Some(v[mid])
    }
}

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Median spacing between consecutive, strictly increasing samples.
pub fn median_cadence(times: &[f64]) -> Option<f64> {
    if times.len() < 2 {
        return None;
    }
    let dts: Vec<f64> = times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|dt| dt.is_finite() && *dt > 0.0)
        .collect();
    if dts.is_empty() {
        return None;
    }
    median(&dts)
}

pub fn median_absolute_deviation(arr: &[f64]) -> Option<f64> {
    if arr.is_empty() {
        return None;
    }

    let med = median(arr)?;
    let deviations: Vec<f64> = arr
        .iter()
        .copied()
        .filter(|f| f.is_finite())
        .map(|f| (f - med).abs())
        .collect();

    if deviations.is_empty() {
        return None;
    }
    median(&deviations)
}

/// Index and value of the smallest finite element.
pub fn argmin(data: &[f64]) -> Option<(usize, f64)> {
    data.iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Split a time axis into `(start, end)` index ranges (end exclusive) wherever
/// the spacing exceeds `gap_factor` times the median cadence.
pub fn segment_on_gaps(t: &[f64], gap_factor: f64) -> Vec<(usize, usize)> {
    let mut segment_bounds: Vec<(usize, usize)> = Vec::new();
    if t.is_empty() {
        return segment_bounds;
    }
    let Some(dt_med) = median_cadence(t) else {
        return vec![(0, t.len())];
    };
    let threshold = dt_med * gap_factor;

    let mut start = 0;
    for i in 1..t.len() {
        if (t[i] - t[i - 1]) > threshold {
            segment_bounds.push((start, i));
            start = i;
        }
    }

    segment_bounds.push((start, t.len()));
    segment_bounds
}
