//! RSI (Relative Strength Index) indicator implementation.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100 (this includes a perfectly flat series).
//!
//! Warmup: first n rows are `None` (n price changes are needed for the first average).

use crate::domain::indicator_helpers::{finite, wilder_step};

pub fn calculate_rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let mut gains = Vec::with_capacity(values.len() - 1);
    let mut losses = Vec::with_capacity(values.len() - 1);
    for w in values.windows(2) {
        let change = w[1] - w[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    out[period] = rsi_from(avg_gain, avg_loss);

    for i in (period + 1)..values.len() {
        avg_gain = wilder_step(avg_gain, gains[i - 1], period);
        avg_loss = wilder_step(avg_loss, losses[i - 1], period);
        out[i] = rsi_from(avg_gain, avg_loss);
    }
    out
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    finite(100.0 - (100.0 / (1.0 + avg_gain / avg_loss)))
}
