//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seeded with the first input, then EMA[i] = x[i]*k + EMA[i-1]*(1-k).
//! No warmup: every row is defined.

use crate::domain::indicator_helpers::finite;

pub fn calculate_ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema: Option<f64> = None;

    for &x in values {
        let next = match ema {
            None => x,
            Some(prev) => x * k + prev * (1.0 - k),
        };
        ema = Some(next);
        out.push(finite(next));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_seed_is_first_value() {
        let out = calculate_ema(&[10.0, 20.0, 30.0], 3);
        assert_eq!(out[0], Some(10.0));
    }

    #[test]
    fn ema_recursive_calculation() {
        let out = calculate_ema(&[10.0, 20.0, 30.0, 40.0], 3);
        let k = 2.0 / 4.0;

        let e1 = 20.0 * k + 10.0 * (1.0 - k);
        let e2 = 30.0 * k + e1 * (1.0 - k);
        let e3 = 40.0 * k + e2 * (1.0 - k);
        assert!((out[1].unwrap() - e1).abs() < f64::EPSILON);
        assert!((out[2].unwrap() - e2).abs() < f64::EPSILON);
        assert!((out[3].unwrap() - e3).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_period_1_is_identity() {
        let out = calculate_ema(&[10.0, 20.0, 30.0], 1);
        assert_eq!(out, vec![Some(10.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn ema_equal_prices() {
        let out = calculate_ema(&[100.0; 5], 3);
        for v in out {
            assert!((v.unwrap() - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn ema_empty_and_period_0() {
        assert!(calculate_ema(&[], 3).is_empty());
        assert_eq!(calculate_ema(&[1.0, 2.0], 0), vec![None, None]);
    }

    #[test]
    fn ema_smoothing_factor() {
        let period = 10;
        let k = 2.0 / (period as f64 + 1.0);
        assert!((k - 2.0 / 11.0).abs() < f64::EPSILON);
    }
}
