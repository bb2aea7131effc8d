//! CSV file data adapter.
//!
//! One file per instrument, named after the instrument with `/` and `:`
//! replaced by `_` (`BTC/USDT:USDT` reads `BTC_USDT_USDT.csv`). Columns are
//! `timestamp,open,high,low,close,volume`; timestamps are either
//! `%Y-%m-%d %H:%M:%S` or unix milliseconds.

use crate::domain::error::SigtraderError;
use crate::domain::ohlcv::{Candle, Series};
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn file_stem(instrument: &str) -> String {
        instrument.replace(['/', ':'], "_")
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.csv", Self::file_stem(instrument)))
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT) {
        return Some(ts);
    }
    let millis: i64 = value.parse().ok()?;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

fn parse_record(record: &csv::StringRecord) -> Result<Candle, String> {
    let field = |index: usize, label: &str| -> Result<f64, String> {
        let raw = record
            .get(index)
            .ok_or_else(|| format!("missing {} column", label))?;
        raw.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid {} value '{}': {}", label, raw, e))
    };

    let raw_ts = record.get(0).ok_or("missing timestamp column")?;
    let timestamp =
        parse_timestamp(raw_ts).ok_or_else(|| format!("invalid timestamp '{}'", raw_ts))?;
    let candle = Candle {
        timestamp,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    };

    let prices = [candle.open, candle.high, candle.low, candle.close];
    if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err("prices must be positive and finite".into());
    }
    if !candle.volume.is_finite() || candle.volume < 0.0 {
        return Err("volume must be non-negative".into());
    }
    Ok(candle)
}

impl DataPort for CsvAdapter {
    fn fetch_series(
        &self,
        instrument: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Series, SigtraderError> {
        let path = self.csv_path(instrument);
        let content = fs::read_to_string(&path).map_err(|e| SigtraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut candles = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| SigtraderError::Data {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;

            let candle = match parse_record(&record) {
                Ok(candle) => candle,
                Err(reason) => {
                    warn!(instrument, row = line + 1, %reason, "skipping malformed row");
                    continue;
                }
            };

            if start.is_some_and(|s| candle.timestamp < s)
                || end.is_some_and(|e| candle.timestamp > e)
            {
                continue;
            }
            candles.push(candle);
        }

        candles.sort_by_key(|c| c.timestamp);
        let before = candles.len();
        candles.dedup_by_key(|c| c.timestamp);
        if candles.len() < before {
            warn!(
                instrument,
                dropped = before - candles.len(),
                "dropping rows with duplicate timestamps"
            );
        }

        Series::new(candles)
    }

    fn list_instruments(&self) -> Result<Vec<String>, SigtraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| SigtraderError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut stems = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SigtraderError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(stem) = name_str.strip_suffix(".csv") {
                stems.push(stem.to_string());
            }
        }

        stems.sort();
        Ok(stems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "timestamp,open,high,low,close,volume\n\
            2024-01-15 02:00:00,110.0,120.0,105.0,115.0,55000\n\
            2024-01-15 00:00:00,100.0,110.0,90.0,105.0,50000\n\
            2024-01-15 01:00:00,105.0,115.0,100.0,110.0,60000\n";

        fs::write(path.join("BTC_USDT_USDT.csv"), csv_content).unwrap();
        fs::write(
            path.join("ETH_USDT_USDT.csv"),
            "timestamp,open,high,low,close,volume\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn file_stem_replaces_separators() {
        assert_eq!(CsvAdapter::file_stem("BTC/USDT:USDT"), "BTC_USDT_USDT");
        assert_eq!(CsvAdapter::file_stem("AAPL"), "AAPL");
    }

    #[test]
    fn parse_timestamp_accepts_both_formats() {
        assert_eq!(parse_timestamp("2024-01-15 01:00:00"), Some(ts(15, 1)));
        assert_eq!(parse_timestamp("1705280400000"), Some(ts(15, 1)));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn fetch_sorts_rows() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter.fetch_series("BTC/USDT:USDT", None, None).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.candles()[0].timestamp, ts(15, 0));
        assert_eq!(series.candles()[0].open, 100.0);
        assert_eq!(series.candles()[0].volume, 50000.0);
        assert_eq!(series.closes(), vec![105.0, 110.0, 115.0]);
    }

    #[test]
    fn fetch_filters_by_range() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter
            .fetch_series("BTC/USDT:USDT", Some(ts(15, 1)), Some(ts(15, 1)))
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.candles()[0].timestamp, ts(15, 1));
    }

    #[test]
    fn malformed_and_duplicate_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("SOL.csv"),
            "timestamp,open,high,low,close,volume\n\
             1705276800000,10,11,9,10.5,100\n\
             2024-01-15 01:00:00,10,11,9,abc,100\n\
             2024-01-15 02:00:00,-1,11,9,10,100\n\
             1705276800000,10,11,9,10.7,100\n\
             2024-01-15 03:00:00,10,11,9,10.9,100\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let series = adapter.fetch_series("SOL", None, None).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.candles()[1].close, 10.9);
    }

    #[test]
    fn fetch_errors_for_missing_file() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let result = adapter.fetch_series("XRP/USDT:USDT", None, None);
        assert!(matches!(result, Err(SigtraderError::Data { .. })));
    }

    #[test]
    fn list_instruments_returns_file_stems() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(
            adapter.list_instruments().unwrap(),
            vec!["BTC_USDT_USDT", "ETH_USDT_USDT"]
        );
    }
}
