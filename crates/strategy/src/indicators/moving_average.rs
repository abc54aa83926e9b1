/// Simple moving average over the trailing `window` values.
/// `None` for the first `window - 1` rows.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            Some(slice.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Exponentially weighted mean with smoothing factor `alpha`, seeded by the
/// first value: `out[i] = out[i-1] + alpha * (x[i] - out[i-1])`.
///
/// A NaN input carries the previous value forward.
pub fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &x in values {
        let next = match prev {
            None => x,
            Some(p) if x.is_nan() => p,
            Some(p) if p.is_nan() => x,
            // Written as an increment so a constant input reproduces itself exactly.
            Some(p) => p + alpha * (x - p),
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// EMA with span `span`: `alpha = 2 / (span + 1)`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    ewm(values, 2.0 / (span as f64 + 1.0))
}

/// Rolling maximum over the trailing `window` values. Rows with fewer than
/// `min_periods` values available are `None`.
pub fn rolling_max(values: &[f64], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            if window == 0 || slice.len() < min_periods.max(1) {
                return None;
            }
            slice.iter().copied().reduce(f64::max)
        })
        .collect()
}
