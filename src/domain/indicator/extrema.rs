//! Rolling window maximum and minimum. Warmup: n-1 rows.

use crate::domain::indicator_helpers::rolling;

pub fn calculate_rolling_max(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |w| w.iter().copied().reduce(f64::max))
}

pub fn calculate_rolling_min(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |w| w.iter().copied().reduce(f64::min))
}
