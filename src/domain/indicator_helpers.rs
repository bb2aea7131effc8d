//! Shared helper functions for indicator calculations.

/// `a / b`, or `None` when the quotient is not a finite number.
pub fn safe_div(a: f64, b: f64) -> Option<f64> {
    if b == 0.0 {
        return None;
    }
    finite(a / b)
}

pub fn finite(v: f64) -> Option<f64> {
    if v.is_finite() { Some(v) } else { None }
}

/// One step of Wilder's smoothing: `(prev * (n-1) + current) / n`.
pub fn wilder_step(prev: f64, current: f64, period: usize) -> f64 {
    (prev * (period - 1) as f64 + current) / period as f64
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divides by N).
pub fn population_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Sample variance (divides by N-1). `None` for fewer than two values.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    finite(ss / (values.len() - 1) as f64)
}

/// Start index of the longest trailing run of defined, finite values.
pub fn defined_tail_start(values: &[Option<f64>]) -> usize {
    values
        .iter()
        .rposition(|v| !matches!(v, Some(x) if x.is_finite()))
        .map_or(0, |i| i + 1)
}

/// Apply a slice computation to the trailing defined run of `values`,
/// padding the rows before it with `None`.
pub fn on_defined_tail<F>(values: &[Option<f64>], compute: F) -> Vec<Option<f64>>
where
    F: FnOnce(&[f64]) -> Vec<Option<f64>>,
{
    let start = defined_tail_start(values);
    let tail: Vec<f64> = values[start..].iter().flatten().copied().collect();
    let mut out = vec![None; start];
    out.extend(compute(&tail));
    out
}

/// Apply a rolling-window reduction; rows before the first full window are `None`.
pub fn rolling<F>(values: &[f64], period: usize, reduce: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    if period == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                reduce(&values[i + 1 - period..=i])
            }
        })
        .collect()
}

/// Per-row true range; the first row uses `high - low`.
pub fn true_ranges(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                hl
            } else {
                let hc = (high[i] - close[i - 1]).abs();
                let lc = (low[i] - close[i - 1]).abs();
                hl.max(hc).max(lc)
            }
        })
        .collect()
}
