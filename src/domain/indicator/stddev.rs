//! Rolling standard deviation and returns volatility.
//!
//! STDDEV(n): population standard deviation of the trailing n values.
//! Warmup: n-1 rows.
//!
//! VOLATILITY(n): sample standard deviation (N-1) of the trailing n one-row
//! percentage changes. Warmup: n rows.

use crate::domain::indicator::calculate_pct_change;
use crate::domain::indicator_helpers::{finite, population_variance, rolling, sample_variance};

pub fn calculate_stddev(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |w| finite(population_variance(w).sqrt()))
}

pub fn calculate_volatility(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period < 2 {
        return out;
    }
    let returns = calculate_pct_change(values, 1);
    for i in period..n {
        let window: Option<Vec<f64>> = returns[i + 1 - period..=i].iter().copied().collect();
        out[i] = window.and_then(|w| sample_variance(&w)).map(f64::sqrt);
    }
    out
}
