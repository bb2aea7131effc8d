//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! Where StdDev is population standard deviation (divides by N, not N-1).
//!
//! Default parameters: period=20, multiplier=2.0
//! Warmup: first (period-1) rows are `None`.

use crate::domain::indicator_helpers::{finite, mean, population_variance};

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

pub fn calculate_bollinger(values: &[f64], period: usize, mult: f64) -> BollingerBands {
    let n = values.len();
    let mut bands = BollingerBands {
        upper: vec![None; n],
        middle: vec![None; n],
        lower: vec![None; n],
    };
    if period == 0 {
        return bands;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        let middle = mean(window);
        let stddev = population_variance(window).sqrt();
        bands.middle[i] = finite(middle);
        bands.upper[i] = finite(middle + mult * stddev);
        bands.lower[i] = finite(middle - mult * stddev);
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_warmup() {
        let b = calculate_bollinger(&[1.0, 2.0, 3.0, 4.0], 3, 2.0);
        assert_eq!(b.middle[..2], [None, None]);
        assert!(b.upper[2].is_some());
    }

    #[test]
    fn bollinger_flat_prices_collapse() {
        let b = calculate_bollinger(&[50.0; 5], 3, 2.0);
        for i in 2..5 {
            assert_eq!(b.upper[i], b.lower[i]);
            assert_eq!(b.middle[i], Some(50.0));
        }
    }

    #[test]
    fn bollinger_known_values() {
        // window [2, 4, 6]: mean 4, population variance 8/3
        let b = calculate_bollinger(&[2.0, 4.0, 6.0], 3, 2.0);
        let sd = (8.0_f64 / 3.0).sqrt();
        assert!((b.middle[2].unwrap() - 4.0).abs() < 1e-12);
        assert!((b.upper[2].unwrap() - (4.0 + 2.0 * sd)).abs() < 1e-12);
        assert!((b.lower[2].unwrap() - (4.0 - 2.0 * sd)).abs() < 1e-12);
    }

    #[test]
    fn bollinger_symmetric_around_middle() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64).cos() * 3.0).collect();
        let b = calculate_bollinger(&values, 20, 2.0);
        for i in 19..30 {
            let up = b.upper[i].unwrap() - b.middle[i].unwrap();
            let down = b.middle[i].unwrap() - b.lower[i].unwrap();
            assert!((up - down).abs() < 1e-9);
        }
    }

    #[test]
    fn bollinger_period_zero() {
        let b = calculate_bollinger(&[1.0, 2.0], 0, 2.0);
        assert!(b.middle.iter().all(Option::is_none));
    }
}
