//! Candle data access port trait.

use crate::domain::error::SigtraderError;
use crate::domain::ohlcv::Series;
use chrono::NaiveDateTime;

pub trait DataPort {
    /// Candles for `instrument` with `start <= timestamp <= end`; an open
    /// bound is unbounded.
    fn fetch_series(
        &self,
        instrument: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Series, SigtraderError>;

    fn list_instruments(&self) -> Result<Vec<String>, SigtraderError>;
}
