//! Average Directional Index.
//!
//! +DM/-DM and TR are summed over the first n changes, then Wilder-smoothed
//! (`sum - sum/n + current`). DI = 100 * DM / TR, DX = 100 * |DI+ - DI-| / (DI+ + DI-).
//! ADX seed = mean of the first n DX values, then `(prev*(n-1) + DX) / n`.
//!
//! Warmup: 2n-1 rows. A row with undefined DX (zero range) makes ADX undefined
//! and restarts the seed from the next defined DX.

use crate::domain::indicator_helpers::{finite, safe_div, wilder_step};

pub fn calculate_adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = close.len();
    let mut out = vec![None; n];
    if period == 0 || n < 2 * period {
        return out;
    }

    let dx = directional_index(high, low, close, period);

    let mut seed: Vec<f64> = Vec::with_capacity(period);
    let mut adx: Option<f64> = None;
    for i in period..n {
        let Some(d) = dx[i] else {
            seed.clear();
            adx = None;
            continue;
        };
        adx = match adx {
            Some(prev) => Some(wilder_step(prev, d, period)),
            None => {
                seed.push(d);
                if seed.len() == period {
                    let first = seed.iter().sum::<f64>() / period as f64;
                    seed.clear();
                    Some(first)
                } else {
                    None
                }
            }
        };
        out[i] = adx.and_then(finite);
    }
    out
}

/// DX per row; defined from row `period` onward.
fn directional_index(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = close.len();
    let mut dx = vec![None; n];

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    let mut tr = vec![0.0; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        let hl = high[i] - low[i];
        tr[i] = hl
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
    }

    let mut sm_tr: f64 = tr[1..=period].iter().sum();
    let mut sm_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut sm_minus: f64 = minus_dm[1..=period].iter().sum();
    dx[period] = dx_from(sm_plus, sm_minus, sm_tr);

    let p = period as f64;
    for i in (period + 1)..n {
        sm_tr = sm_tr - sm_tr / p + tr[i];
        sm_plus = sm_plus - sm_plus / p + plus_dm[i];
        sm_minus = sm_minus - sm_minus / p + minus_dm[i];
        dx[i] = dx_from(sm_plus, sm_minus, sm_tr);
    }
    dx
}

fn dx_from(sm_plus: f64, sm_minus: f64, sm_tr: f64) -> Option<f64> {
    let di_plus = 100.0 * safe_div(sm_plus, sm_tr)?;
    let di_minus = 100.0 * safe_div(sm_minus, sm_tr)?;
    safe_div(100.0 * (di_plus - di_minus).abs(), di_plus + di_minus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag(n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.9).sin() * 4.0 + i as f64 * 0.1).collect();
        let high = close.iter().map(|c| c + 1.0).collect();
        let low = close.iter().map(|c| c - 1.0).collect();
        (high, low, close)
    }

    #[test]
    fn adx_warmup_is_2n_minus_1() {
        let (h, l, c) = zigzag(60);
        let out = calculate_adx(&h, &l, &c, 14);
        let leading = out.iter().take_while(|v| v.is_none()).count();
        assert_eq!(leading, 27);
        assert!(out[27..].iter().all(Option::is_some));
    }

    #[test]
    fn adx_bounded() {
        let (h, l, c) = zigzag(100);
        for v in calculate_adx(&h, &l, &c, 7).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn adx_strong_trend_is_high() {
        let close: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 2.0).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
        let out = calculate_adx(&high, &low, &close, 14);
        assert!((out[59].unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn adx_zero_range_is_undefined() {
        let flat = [100.0; 40];
        let out = calculate_adx(&flat, &flat, &flat, 5);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn adx_short_series() {
        let (h, l, c) = zigzag(20);
        assert!(calculate_adx(&h, &l, &c, 14).iter().all(Option::is_none));
    }
}
