//! Percentage change over n rows.
//!
//! PCT_CHANGE(n)[i] = x[i] / x[i-n] - 1, as a fraction.
//! If x[i-n] == 0 the row is `None`.
//! Warmup: first n rows.

use crate::domain::indicator_helpers::safe_div;

pub fn calculate_pct_change(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for i in period..values.len() {
        out[i] = safe_div(values[i], values[i - period]).map(|r| r - 1.0);
    }
    out
}
