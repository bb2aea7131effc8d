#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use sigtrader::adapters::csv_adapter::CsvAdapter;
use sigtrader::adapters::file_config_adapter::FileConfigAdapter;
use sigtrader::domain::config_validation::load_strategy_config;
use sigtrader::domain::error::SigtraderError;
use sigtrader::domain::ohlcv::{Candle, Series};
use sigtrader::domain::strategy::StrategyConfig;
use sigtrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// One candle per minute; open is the previous close, the range is +-0.1%.
pub fn series_from_closes(closes: &[f64]) -> Series {
    series_with_volume(closes, &vec![1000.0; closes.len()])
}

pub fn series_with_volume(closes: &[f64], volumes: &[f64]) -> Series {
    let candles = closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                timestamp: start() + Duration::minutes(i as i64),
                open,
                high: open.max(close) * 1.001,
                low: open.min(close) * 0.999,
                close,
                volume,
            }
        })
        .collect();
    Series::new(candles).unwrap()
}

/// Close rising by `rate` per row.
pub fn rising_closes(n: usize, rate: f64) -> Vec<f64> {
    (0..n).map(|i| 100.0 * (1.0 + rate).powi(i as i32)).collect()
}

/// Falls 0.1% per row for 149 rows, then rises 0.1% per row.
pub fn v_shape_closes() -> Vec<f64> {
    let mut price = 100.0;
    let mut closes = Vec::with_capacity(300);
    for i in 0..300 {
        closes.push(price);
        price *= if i < 149 { 0.999 } else { 1.001 };
    }
    closes
}

pub fn sine_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 * (1.0 + 0.01 * (0.3 * i as f64).sin()))
        .collect()
}

pub fn strategy_from_ini(content: &str) -> Result<StrategyConfig, SigtraderError> {
    let adapter = FileConfigAdapter::from_string(content)?;
    load_strategy_config(&adapter)
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Write `series` as `<instrument>.csv` under `dir`.
pub fn write_csv(dir: &Path, instrument: &str, series: &Series) {
    let path = dir.join(format!("{}.csv", CsvAdapter::file_stem(instrument)));
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer
        .write_record(["timestamp", "open", "high", "low", "close", "volume"])
        .unwrap();
    for c in series.candles() {
        writer
            .write_record([
                c.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                c.open.to_string(),
                c.high.to_string(),
                c.low.to_string(),
                c.close.to_string(),
                c.volume.to_string(),
            ])
            .unwrap();
    }
    writer.flush().unwrap();
}

pub struct MockDataPort {
    pub data: HashMap<String, Series>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, instrument: &str, series: Series) -> Self {
        self.data.insert(instrument.to_string(), series);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_series(
        &self,
        instrument: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Series, SigtraderError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(SigtraderError::Data {
                reason: reason.clone(),
            });
        }
        let candles = self
            .data
            .get(instrument)
            .map(|s| {
                s.candles()
                    .iter()
                    .filter(|c| start.is_none_or(|s| c.timestamp >= s))
                    .filter(|c| end.is_none_or(|e| c.timestamp <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Series::new(candles)
    }

    fn list_instruments(&self) -> Result<Vec<String>, SigtraderError> {
        let mut names: Vec<String> = self.data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

pub const EMA_CROSS_INI: &str = r#"
[strategy]
name = ema_cross
timeframe = 1m
startup_gate = off
entry = AND(CROSS_ABOVE(fast, slow), BELOW(rsi, 70))
exit = CROSS_BELOW(fast, slow)

[features]
fast = EMA(close, 9)
slow = EMA(close, 21)
rsi = RSI(close, 14)

[stoploss]
floor = -0.05
"#;
