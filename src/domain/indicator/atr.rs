//! Average True Range and its close-normalised form.
//!
//! TR[0] = high - low; TR[i] = max(h-l, |h-prev_c|, |l-prev_c|).
//! ATR seed = mean of the first n TR values, then Wilder smoothing.
//! NATR = ATR / close, as a fraction.
//! Warmup: first (n-1) rows are `None`.

use crate::domain::indicator_helpers::{finite, safe_div, true_ranges, wilder_step};

pub fn calculate_atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = close.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let tr = true_ranges(high, low, close);
    let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = finite(atr);
    for i in period..n {
        atr = wilder_step(atr, tr[i], period);
        out[i] = finite(atr);
    }
    out
}

pub fn calculate_natr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    calculate_atr(high, low, close, period)
        .into_iter()
        .zip(close)
        .map(|(atr, &c)| safe_div(atr?, c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atr_warmup() {
        let high = [110.0; 5];
        let low = [90.0; 5];
        let close = [100.0; 5];
        let out = calculate_atr(&high, &low, &close, 3);
        assert_eq!(out[..2], [None, None]);
        assert!(out[2..].iter().all(Option::is_some));
    }

    #[test]
    fn atr_seed_is_average() {
        let high = [110.0, 115.0, 120.0];
        let low = [100.0, 105.0, 110.0];
        let close = [105.0, 110.0, 115.0];
        let out = calculate_atr(&high, &low, &close, 3);
        assert!((out[2].unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn atr_wilder_smoothing() {
        let high = [110.0, 115.0, 120.0, 125.0];
        let low = [100.0, 105.0, 110.0, 115.0];
        let close = [105.0, 110.0, 115.0, 120.0];
        let out = calculate_atr(&high, &low, &close, 3);
        let expected = (10.0 * 2.0 + 10.0) / 3.0;
        assert!((out[3].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_insufficient_rows() {
        let out = calculate_atr(&[110.0, 110.0], &[90.0, 90.0], &[100.0, 100.0], 5);
        assert_eq!(out, vec![None, None]);
    }

    #[test]
    fn natr_is_fraction_of_close() {
        let high = [110.0; 4];
        let low = [90.0; 4];
        let close = [100.0; 4];
        let out = calculate_natr(&high, &low, &close, 2);
        assert!((out[3].unwrap() - 0.2).abs() < 1e-9);
    }
}
