//! Simple Moving Average.
//!
//! SMA(n)[i] = mean of the trailing n values. Warmup: first (n-1) rows are `None`.

use crate::domain::indicator_helpers::{finite, mean, rolling};

pub fn calculate_sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |w| finite(mean(w)))
}
