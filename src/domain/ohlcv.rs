//! OHLCV candle and series representation.

use crate::domain::error::SigtraderError;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Which raw candle field a computation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub const ALL: [PriceField; 5] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::Volume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PriceField::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn read(self, candle: &Candle) -> f64 {
        match self {
            PriceField::Open => candle.open,
            PriceField::High => candle.high,
            PriceField::Low => candle.low,
            PriceField::Close => candle.close,
            PriceField::Volume => candle.volume,
        }
    }
}

/// A chronologically ordered run of candles for one instrument.
///
/// Timestamps are strictly increasing; gaps between them are allowed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    candles: Vec<Candle>,
}

impl Series {
    pub fn new(candles: Vec<Candle>) -> Result<Self, SigtraderError> {
        for (i, c) in candles.iter().enumerate() {
            for (label, v) in [("open", c.open), ("high", c.high), ("low", c.low), ("close", c.close)] {
                if !v.is_finite() || v <= 0.0 {
                    return Err(SigtraderError::InvalidSeries {
                        reason: format!("row {}: {} must be positive and finite, got {}", i, label, v),
                    });
                }
            }
            if !c.volume.is_finite() || c.volume < 0.0 {
                return Err(SigtraderError::InvalidSeries {
                    reason: format!("row {}: volume must be non-negative, got {}", i, c.volume),
                });
            }
            if i > 0 && c.timestamp <= candles[i - 1].timestamp {
                return Err(SigtraderError::InvalidSeries {
                    reason: format!(
                        "row {}: timestamp {} does not follow {}",
                        i,
                        c.timestamp,
                        candles[i - 1].timestamp
                    ),
                });
            }
        }
        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// One raw field as a column.
    pub fn field(&self, field: PriceField) -> Vec<f64> {
        self.candles.iter().map(|c| field.read(c)).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.field(PriceField::Close)
    }

    /// The first `len` candles as a new series.
    pub fn head(&self, len: usize) -> Series {
        Series {
            candles: self.candles[..len.min(self.candles.len())].to_vec(),
        }
    }
}
