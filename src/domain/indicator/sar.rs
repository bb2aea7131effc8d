//! Wilder's Parabolic SAR.
//!
//! The initial direction is long when the first upward move (+DM) is at least
//! the first downward move (-DM). The first SAR (row 1) is the prior row's
//! low (long) or high (short), with the extreme point taken from row 1.
//! Afterwards: `SAR = SAR + af * (EP - SAR)`, never inside the previous two
//! rows' range. When price penetrates the SAR the trend reverses: SAR jumps
//! to the old extreme point and `af` resets. A new extreme raises `af` by
//! `accel` up to `max`.
//!
//! Warmup: row 0 is `None`.

use crate::domain::indicator_helpers::finite;

pub fn calculate_sar(high: &[f64], low: &[f64], accel: f64, max: f64) -> Vec<Option<f64>> {
    let n = high.len();
    let mut out = vec![None; n];
    if n < 2 || accel <= 0.0 || max < accel {
        return out;
    }

    let up_move = high[1] - high[0];
    let down_move = low[0] - low[1];
    let mut long = up_move >= down_move;

    let mut sar = if long { low[0] } else { high[0] };
    let mut ep = if long { high[1] } else { low[1] };
    let mut af = accel;
    out[1] = finite(sar);

    for i in 2..n {
        let mut next = sar + af * (ep - sar);
        if long {
            next = next.min(low[i - 1]).min(low[i - 2]);
            if low[i] <= next {
                long = false;
                next = ep;
                ep = low[i];
                af = accel;
            } else if high[i] > ep {
                ep = high[i];
                af = (af + accel).min(max);
            }
        } else {
            next = next.max(high[i - 1]).max(high[i - 2]);
            if high[i] >= next {
                long = true;
                next = ep;
                ep = high[i];
                af = accel;
            } else if low[i] < ep {
                ep = low[i];
                af = (af + accel).min(max);
            }
        }
        sar = next;
        out[i] = finite(sar);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sar_first_row_undefined() {
        let out = calculate_sar(&[10.0, 11.0, 12.0], &[9.0, 10.0, 11.0], 0.02, 0.2);
        assert_eq!(out[0], None);
        assert_eq!(out[1], Some(9.0));
    }

    #[test]
    fn sar_stays_below_rising_prices() {
        let high: Vec<f64> = (0..50).map(|i| 101.0 + i as f64).collect();
        let low: Vec<f64> = (0..50).map(|i| 99.0 + i as f64).collect();
        let out = calculate_sar(&high, &low, 0.02, 0.2);
        for i in 1..50 {
            assert!(out[i].unwrap() < low[i], "row {}", i);
        }
    }

    #[test]
    fn sar_stays_above_falling_prices() {
        let high: Vec<f64> = (0..50).map(|i| 201.0 - i as f64).collect();
        let low: Vec<f64> = (0..50).map(|i| 199.0 - i as f64).collect();
        let out = calculate_sar(&high, &low, 0.02, 0.2);
        for i in 1..50 {
            assert!(out[i].unwrap() > high[i], "row {}", i);
        }
    }

    #[test]
    fn sar_reverses_on_penetration() {
        // rise then collapse below the trailing stop
        let mut high: Vec<f64> = (0..10).map(|i| 101.0 + i as f64).collect();
        let mut low: Vec<f64> = (0..10).map(|i| 99.0 + i as f64).collect();
        high.push(95.0);
        low.push(90.0);
        let out = calculate_sar(&high, &low, 0.02, 0.2);
        // after reversal SAR is the prior extreme high
        assert_eq!(out[10], Some(110.0));
    }

    #[test]
    fn sar_bad_parameters() {
        let out = calculate_sar(&[10.0, 11.0], &[9.0, 10.0], 0.0, 0.2);
        assert!(out.iter().all(Option::is_none));
    }
}
