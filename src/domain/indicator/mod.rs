//! Technical indicator implementations.
//!
//! Every calculation takes ordered numeric slices and returns one
//! `Vec<Option<f64>>` per output line, the same length as the input. Rows
//! inside the warm-up, and rows where an intermediate is not finite, are
//! `None`. Bad parameters (period 0, series shorter than the warm-up) yield
//! all-`None` output rather than an error.
//!
//! - `IndicatorType`: indicator identity + parameters (serves as HashMap key)
//! - `IndicatorField`: which line of a multi-line indicator to read
//! - `IndicatorOutput`: the computed lines

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod extrema;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sar;
pub mod sma;
pub mod stddev;
pub mod vwap;

use crate::domain::indicator_helpers::{defined_tail_start, on_defined_tail};
use crate::domain::ohlcv::{PriceField, Series};
use std::fmt;

pub use adx::calculate_adx;
pub use atr::{calculate_atr, calculate_natr};
pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use extrema::{calculate_rolling_max, calculate_rolling_min};
pub use macd::calculate_macd;
pub use roc::calculate_pct_change;
pub use rsi::calculate_rsi;
pub use sar::calculate_sar;
pub use sma::calculate_sma;
pub use stddev::{calculate_stddev, calculate_volatility};
pub use vwap::calculate_vwap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Natr(usize),
    Adx(usize),
    Stddev(usize),
    Volatility(usize),
    RollingMax(usize),
    RollingMin(usize),
    PctChange(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    /// Float parameters are stored as `f64::to_bits` so the cache key is exact.
    Bollinger {
        period: usize,
        stddev_mult_bits: u64,
    },
    Sar {
        accel_bits: u64,
        max_bits: u64,
    },
    Vwap {
        reset: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorField {
    Value,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorOutput {
    Single(Vec<Option<f64>>),
    Macd {
        line: Vec<Option<f64>>,
        signal: Vec<Option<f64>>,
        histogram: Vec<Option<f64>>,
    },
    Bollinger {
        upper: Vec<Option<f64>>,
        middle: Vec<Option<f64>>,
        lower: Vec<Option<f64>>,
    },
}

impl IndicatorOutput {
    /// The requested line, or `None` if this output has no such field.
    pub fn select(&self, field: IndicatorField) -> Option<&[Option<f64>]> {
        match (self, field) {
            (IndicatorOutput::Single(v), IndicatorField::Value) => Some(v),
            (IndicatorOutput::Macd { line, .. }, IndicatorField::MacdLine) => Some(line),
            (IndicatorOutput::Macd { signal, .. }, IndicatorField::MacdSignal) => Some(signal),
            (IndicatorOutput::Macd { histogram, .. }, IndicatorField::MacdHistogram) => {
                Some(histogram)
            }
            (IndicatorOutput::Bollinger { upper, .. }, IndicatorField::BollingerUpper) => {
                Some(upper)
            }
            (IndicatorOutput::Bollinger { middle, .. }, IndicatorField::BollingerMiddle) => {
                Some(middle)
            }
            (IndicatorOutput::Bollinger { lower, .. }, IndicatorField::BollingerLower) => {
                Some(lower)
            }
            _ => None,
        }
    }
}

impl IndicatorType {
    pub fn bollinger(period: usize, mult: f64) -> Self {
        IndicatorType::Bollinger {
            period,
            stddev_mult_bits: key_bits(mult),
        }
    }

    pub fn sar(accel: f64, max: f64) -> Self {
        IndicatorType::Sar {
            accel_bits: key_bits(accel),
            max_bits: key_bits(max),
        }
    }

    /// Indicators that read the candle's high/low/close/volume directly
    /// instead of a single source column.
    pub fn uses_candles(&self) -> bool {
        matches!(
            self,
            IndicatorType::Atr(_)
                | IndicatorType::Natr(_)
                | IndicatorType::Adx(_)
                | IndicatorType::Sar { .. }
                | IndicatorType::Vwap { .. }
        )
    }

    /// Whether `field` names one of this indicator's output lines.
    pub fn has_field(&self, field: IndicatorField) -> bool {
        match self {
            IndicatorType::Macd { .. } => matches!(
                field,
                IndicatorField::MacdLine | IndicatorField::MacdSignal | IndicatorField::MacdHistogram
            ),
            IndicatorType::Bollinger { .. } => matches!(
                field,
                IndicatorField::BollingerUpper
                    | IndicatorField::BollingerMiddle
                    | IndicatorField::BollingerLower
            ),
            _ => field == IndicatorField::Value,
        }
    }

    /// Parameter problems that would make the output all-`None`.
    pub fn validate(&self) -> Result<(), String> {
        let period_ok = |p: usize, what: &str| {
            if p == 0 {
                Err(format!("{} period must be at least 1", what))
            } else {
                Ok(())
            }
        };
        match *self {
            IndicatorType::Sma(p)
            | IndicatorType::Ema(p)
            | IndicatorType::Rsi(p)
            | IndicatorType::Atr(p)
            | IndicatorType::Natr(p)
            | IndicatorType::Adx(p)
            | IndicatorType::Stddev(p)
            | IndicatorType::RollingMax(p)
            | IndicatorType::RollingMin(p)
            | IndicatorType::PctChange(p) => period_ok(p, &self.to_string()),
            IndicatorType::Volatility(p) => {
                if p < 2 {
                    Err(format!("{} needs a period of at least 2", self))
                } else {
                    Ok(())
                }
            }
            IndicatorType::Macd { fast, slow, signal } => {
                period_ok(fast, "MACD fast")?;
                period_ok(slow, "MACD slow")?;
                period_ok(signal, "MACD signal")
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_bits,
            } => {
                period_ok(period, "BOLLINGER")?;
                let mult = f64::from_bits(stddev_mult_bits);
                if mult.is_finite() && mult >= 0.0 {
                    Ok(())
                } else {
                    Err(format!("{} needs a finite non-negative multiplier", self))
                }
            }
            IndicatorType::Sar {
                accel_bits,
                max_bits,
            } => {
                let accel = f64::from_bits(accel_bits);
                let max = f64::from_bits(max_bits);
                if accel.is_finite() && max.is_finite() && accel > 0.0 && accel <= max {
                    Ok(())
                } else {
                    Err(format!("{} needs 0 < accel <= max", self))
                }
            }
            IndicatorType::Vwap { .. } => Ok(()),
        }
    }

    /// Number of leading `None` rows on an all-defined input.
    pub fn warmup(&self) -> usize {
        match *self {
            IndicatorType::Sma(p)
            | IndicatorType::Atr(p)
            | IndicatorType::Natr(p)
            | IndicatorType::Stddev(p)
            | IndicatorType::RollingMax(p)
            | IndicatorType::RollingMin(p) => p.saturating_sub(1),
            IndicatorType::Ema(_) | IndicatorType::Macd { .. } | IndicatorType::Vwap { .. } => 0,
            IndicatorType::Rsi(p) | IndicatorType::Volatility(p) | IndicatorType::PctChange(p) => p,
            IndicatorType::Adx(p) => (2 * p).saturating_sub(1),
            IndicatorType::Bollinger { period, .. } => period.saturating_sub(1),
            IndicatorType::Sar { .. } => 1,
        }
    }

    /// Compute this indicator. Candle-based indicators read `series`; all
    /// others read `source`, evaluated over its trailing run of defined values.
    pub fn compute(&self, series: &Series, source: &[Option<f64>]) -> IndicatorOutput {
        let high = || series.field(PriceField::High);
        let low = || series.field(PriceField::Low);
        let close = || series.field(PriceField::Close);

        match *self {
            IndicatorType::Atr(p) => IndicatorOutput::Single(calculate_atr(&high(), &low(), &close(), p)),
            IndicatorType::Natr(p) => {
                IndicatorOutput::Single(calculate_natr(&high(), &low(), &close(), p))
            }
            IndicatorType::Adx(p) => IndicatorOutput::Single(calculate_adx(&high(), &low(), &close(), p)),
            IndicatorType::Sar {
                accel_bits,
                max_bits,
            } => IndicatorOutput::Single(calculate_sar(
                &high(),
                &low(),
                f64::from_bits(accel_bits),
                f64::from_bits(max_bits),
            )),
            IndicatorType::Vwap { reset } => {
                let typical: Vec<f64> = series.candles().iter().map(|c| c.typical_price()).collect();
                IndicatorOutput::Single(calculate_vwap(
                    &typical,
                    &series.field(PriceField::Volume),
                    reset,
                ))
            }
            IndicatorType::Macd { fast, slow, signal } => {
                let (start, tail) = defined_tail(source);
                let m = calculate_macd(&tail, fast, slow, signal);
                IndicatorOutput::Macd {
                    line: pad_front(start, m.line),
                    signal: pad_front(start, m.signal),
                    histogram: pad_front(start, m.histogram),
                }
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_bits,
            } => {
                let (start, tail) = defined_tail(source);
                let b = calculate_bollinger(&tail, period, f64::from_bits(stddev_mult_bits));
                IndicatorOutput::Bollinger {
                    upper: pad_front(start, b.upper),
                    middle: pad_front(start, b.middle),
                    lower: pad_front(start, b.lower),
                }
            }
            IndicatorType::Sma(p) => single(source, |xs| calculate_sma(xs, p)),
            IndicatorType::Ema(p) => single(source, |xs| calculate_ema(xs, p)),
            IndicatorType::Rsi(p) => single(source, |xs| calculate_rsi(xs, p)),
            IndicatorType::Stddev(p) => single(source, |xs| calculate_stddev(xs, p)),
            IndicatorType::Volatility(p) => single(source, |xs| calculate_volatility(xs, p)),
            IndicatorType::RollingMax(p) => single(source, |xs| calculate_rolling_max(xs, p)),
            IndicatorType::RollingMin(p) => single(source, |xs| calculate_rolling_min(xs, p)),
            IndicatorType::PctChange(p) => single(source, |xs| calculate_pct_change(xs, p)),
        }
    }
}

fn single<F>(source: &[Option<f64>], compute: F) -> IndicatorOutput
where
    F: FnOnce(&[f64]) -> Vec<Option<f64>>,
{
    IndicatorOutput::Single(on_defined_tail(source, compute))
}

// -0.0 and 0.0 share one key.
fn key_bits(value: f64) -> u64 {
    (value + 0.0).to_bits()
}

fn defined_tail(source: &[Option<f64>]) -> (usize, Vec<f64>) {
    let start = defined_tail_start(source);
    (start, source[start..].iter().flatten().copied().collect())
}

fn pad_front(start: usize, values: Vec<Option<f64>>) -> Vec<Option<f64>> {
    let mut out = vec![None; start];
    out.extend(values);
    out
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Natr(period) => write!(f, "NATR({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorType::Volatility(period) => write!(f, "VOLATILITY({})", period),
            IndicatorType::RollingMax(period) => write!(f, "MAX({})", period),
            IndicatorType::RollingMin(period) => write!(f, "MIN({})", period),
            IndicatorType::PctChange(period) => write!(f, "PCT_CHANGE({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_bits,
            } => {
                let mult = f64::from_bits(*stddev_mult_bits);
                write!(f, "BOLLINGER({},{})", period, mult)
            }
            IndicatorType::Sar {
                accel_bits,
                max_bits,
            } => {
                let accel = f64::from_bits(*accel_bits);
                let max = f64::from_bits(*max_bits);
                write!(f, "SAR({},{})", accel, max)
            }
            IndicatorType::Vwap { reset: 0 } => write!(f, "VWAP"),
            IndicatorType::Vwap { reset } => write!(f, "VWAP({})", reset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Candle;
    use chrono::NaiveDate;

    fn flat_series(closes: &[f64]) -> Series {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                timestamp: start + chrono::Duration::minutes(i as i64),
                open: c,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: 1000.0,
            })
            .collect();
        Series::new(candles).unwrap()
    }

    #[test]
    fn indicator_type_display() {
        assert_eq!(IndicatorType::Sma(20).to_string(), "SMA(20)");
        assert_eq!(
            IndicatorType::Macd {
                fast: 12,
                slow: 26,
                signal: 9
            }
            .to_string(),
            "MACD(12,26,9)"
        );
        assert_eq!(IndicatorType::bollinger(20, 2.0).to_string(), "BOLLINGER(20,2)");
        assert_eq!(IndicatorType::sar(0.02, 0.2).to_string(), "SAR(0.02,0.2)");
        assert_eq!(IndicatorType::Vwap { reset: 0 }.to_string(), "VWAP");
    }

    #[test]
    fn indicator_type_hash_eq() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(IndicatorType::Ema(9), "ema9");
        map.insert(IndicatorType::bollinger(20, 2.0), "bb");

        assert_eq!(map.get(&IndicatorType::Ema(9)), Some(&"ema9"));
        assert_eq!(
            map.get(&IndicatorType::Bollinger {
                period: 20,
                stddev_mult_bits: 2.0f64.to_bits()
            }),
            Some(&"bb")
        );
        assert_eq!(map.get(&IndicatorType::Ema(21)), None);
    }

    #[test]
    fn warmups_follow_table() {
        assert_eq!(IndicatorType::Sma(20).warmup(), 19);
        assert_eq!(IndicatorType::Ema(9).warmup(), 0);
        assert_eq!(IndicatorType::Rsi(14).warmup(), 14);
        assert_eq!(IndicatorType::Adx(14).warmup(), 27);
        assert_eq!(IndicatorType::sar(0.02, 0.2).warmup(), 1);
        assert_eq!(IndicatorType::PctChange(9).warmup(), 9);
    }

    #[test]
    fn computed_warmup_matches_declared() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let series = flat_series(&closes);
        let source: Vec<Option<f64>> = closes.iter().copied().map(Some).collect();
        let indicators = [
            IndicatorType::Sma(10),
            IndicatorType::Ema(10),
            IndicatorType::Rsi(14),
            IndicatorType::Atr(14),
            IndicatorType::Natr(14),
            IndicatorType::Adx(14),
            IndicatorType::Stddev(5),
            IndicatorType::Volatility(5),
            IndicatorType::RollingMax(5),
            IndicatorType::RollingMin(5),
            IndicatorType::PctChange(3),
            IndicatorType::sar(0.02, 0.2),
            IndicatorType::Vwap { reset: 0 },
        ];
        for ind in indicators {
            let out = ind.compute(&series, &source);
            let values = out.select(IndicatorField::Value).unwrap();
            let leading = values.iter().take_while(|v| v.is_none()).count();
            assert_eq!(leading, ind.warmup(), "{}", ind);
        }
    }

    #[test]
    fn derived_source_uses_defined_tail() {
        let series = flat_series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let source = vec![None, None, Some(3.0), Some(4.0), Some(5.0)];
        let out = IndicatorType::Sma(2).compute(&series, &source);
        let v = out.select(IndicatorField::Value).unwrap();
        assert_eq!(v, &[None, None, None, Some(3.5), Some(4.5)]);
    }

    #[test]
    fn bollinger_lines_pad_to_source_length() {
        let series = flat_series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let source = vec![None, Some(2.0), Some(3.0), Some(4.0), Some(5.0)];
        let out = IndicatorType::bollinger(3, 2.0).compute(&series, &source);
        let middle = out.select(IndicatorField::BollingerMiddle).unwrap();
        assert_eq!(middle.len(), 5);
        assert_eq!(&middle[..3], &[None, None, None]);
        assert!((middle[3].unwrap() - 3.0).abs() < 1e-12);
        assert!((middle[4].unwrap() - 4.0).abs() < 1e-12);
        assert!(out.select(IndicatorField::Value).is_none());
    }

    #[test]
    fn field_membership() {
        let macd = IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert!(macd.has_field(IndicatorField::MacdHistogram));
        assert!(!macd.has_field(IndicatorField::Value));
        assert!(IndicatorType::Ema(9).has_field(IndicatorField::Value));
    }

    #[test]
    fn validate_rejects_zero_period() {
        assert!(IndicatorType::Ema(0).validate().is_err());
        assert!(IndicatorType::Volatility(1).validate().is_err());
        assert!(IndicatorType::sar(0.2, 0.02).validate().is_err());
        assert!(IndicatorType::Ema(9).validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_multipliers() {
        assert!(IndicatorType::bollinger(5, -2.0).validate().is_err());
        assert!(IndicatorType::bollinger(5, f64::NAN).validate().is_err());
        assert!(IndicatorType::bollinger(5, f64::INFINITY).validate().is_err());
        assert!(IndicatorType::bollinger(5, 0.0).validate().is_ok());
        assert!(IndicatorType::sar(f64::NAN, 0.2).validate().is_err());
        assert!(IndicatorType::sar(-0.02, 0.2).validate().is_err());
        assert!(IndicatorType::sar(0.02, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn float_parameters_keep_full_precision() {
        assert_ne!(IndicatorType::bollinger(5, 2.125), IndicatorType::bollinger(5, 2.13));
        assert_ne!(IndicatorType::sar(0.0215, 0.2), IndicatorType::sar(0.022, 0.2));
        assert_eq!(IndicatorType::bollinger(5, 2.125).to_string(), "BOLLINGER(5,2.125)");
        assert_eq!(IndicatorType::sar(0.0215, 0.2).to_string(), "SAR(0.0215,0.2)");
        assert_eq!(IndicatorType::bollinger(5, -0.0), IndicatorType::bollinger(5, 0.0));
    }

    #[test]
    fn fractional_multiplier_matches_direct_calculation() {
        let closes = [100.0, 102.0, 101.0, 104.0, 107.0, 105.0, 108.0];
        let series = flat_series(&closes);
        let source: Vec<Option<f64>> = closes.iter().copied().map(Some).collect();
        let out = IndicatorType::bollinger(5, 2.125).compute(&series, &source);
        let direct = calculate_bollinger(&closes, 5, 2.125);
        assert_eq!(out.select(IndicatorField::BollingerUpper).unwrap(), &direct.upper[..]);
        assert_eq!(out.select(IndicatorField::BollingerLower).unwrap(), &direct.lower[..]);
    }
}
