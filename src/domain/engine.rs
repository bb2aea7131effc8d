//! Strategy evaluation engine.
//!
//! Owns the per-instrument state that survives between ticks (price buffers
//! and classifier models) and answers the host's per-tick queries: signals,
//! leverage, stop-loss, custom exit and ROI threshold.

use crate::domain::classifier::{ClassifierConfig, ClassifierModel, predict_with};
use crate::domain::error::SigtraderError;
use crate::domain::feature::PASSTHROUGH_COLUMNS;
use crate::domain::feature_table::{FeatureRow, FeatureTable};
use crate::domain::ohlcv::Series;
use crate::domain::pipeline::FeaturePipeline;
use crate::domain::ring_buffer::PriceBuffers;
use crate::domain::risk::TradeContext;
use crate::domain::signal::SignalFrame;
use crate::domain::strategy::StrategyConfig;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

pub struct StrategyEngine {
    config: StrategyConfig,
    pipeline: FeaturePipeline,
    buffers: Option<PriceBuffers>,
    models: HashMap<String, ClassifierModel>,
}

impl StrategyEngine {
    /// Validate the configuration and plan its pipeline. Every column a
    /// rule, risk trigger or classifier reads must exist.
    pub fn new(config: StrategyConfig) -> Result<Self, SigtraderError> {
        config.validate()?;
        let pipeline = FeaturePipeline::new(config.features.clone())?;

        let mut known: BTreeSet<&str> = PASSTHROUGH_COLUMNS.iter().copied().collect();
        known.extend(pipeline.feature_names());
        let table_columns = known.clone();
        if let Some(buffer) = &config.buffer {
            if !known.insert(buffer.column.as_str()) {
                return Err(SigtraderError::ConfigInvalid {
                    section: "buffer".into(),
                    key: "column".into(),
                    reason: format!("'{}' is already a column", buffer.column),
                });
            }
        }

        for rule in config.entry.iter().chain(config.exit.iter()) {
            if let Some(missing) = rule.columns().into_iter().find(|c| !known.contains(c)) {
                return Err(SigtraderError::RuleInvalid {
                    reason: format!("unknown column '{}'", missing),
                });
            }
        }

        let trigger_columns = config
            .risk
            .stages()
            .iter()
            .flat_map(|s| s.adjustments.iter())
            .flat_map(|a| a.trigger.columns());
        let stop_column = config.stoploss.dynamic().map(|d| d.column.as_str());
        if let Some(missing) = trigger_columns
            .chain(stop_column)
            .find(|c| !known.contains(c))
        {
            return Err(SigtraderError::ConfigInvalid {
                section: "risk".into(),
                key: missing.to_string(),
                reason: format!("unknown column '{}'", missing),
            });
        }

        if let Some(classifier) = &config.classifier {
            if let Some(missing) = classifier
                .features
                .iter()
                .find(|c| !table_columns.contains(c.as_str()))
            {
                return Err(SigtraderError::FeatureInvalid {
                    name: missing.clone(),
                    reason: "classifier feature is not a pipeline column".into(),
                });
            }
        }

        let buffers = config.buffer.as_ref().map(|b| PriceBuffers::new(b.size));
        debug!(
            strategy = %config.name,
            warmup = pipeline.warmup(),
            "strategy engine ready"
        );
        Ok(Self {
            config,
            pipeline,
            buffers,
            models: HashMap::new(),
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    pub fn has_model(&self, instrument: &str) -> bool {
        self.models.contains_key(instrument)
    }

    /// Compute features and flags for one tick of `instrument`.
    pub fn populate(&mut self, instrument: &str, series: &Series) -> SignalFrame {
        let mut table = self.pipeline.run(series);
        let n = table.len();

        if let (Some(buffers), Some(buffer)) = (&mut self.buffers, &self.config.buffer) {
            buffers.update(instrument, series);
            let mut column = vec![None; n];
            if let Some(last) = column.last_mut() {
                *last = buffers.momentum(instrument);
            }
            table.insert_column(buffer.column.clone(), column);
        }

        let mut frame =
            SignalFrame::evaluate(table, self.config.entry.as_ref(), self.config.exit.as_ref());

        let warm = n >= self.config.startup_candles;
        if warm && n > 0 {
            self.apply_classifier(instrument, &mut frame);
        }

        if !warm {
            let gate = self.config.startup_gate;
            if gate.gates_entry() {
                frame.enter_long.iter_mut().for_each(|f| *f = false);
            }
            if gate.gates_exit() {
                frame.exit.iter_mut().for_each(|f| *f = false);
            }
        }
        frame
    }

    fn apply_classifier(&mut self, instrument: &str, frame: &mut SignalFrame) {
        let Some(config) = &self.config.classifier else {
            return;
        };
        if !self.models.contains_key(instrument) {
            if let Some(model) = train_on_history(instrument, &frame.table, config) {
                self.models.insert(instrument.to_string(), model);
            }
        }

        let Some(row) = frame.table.last_row() else {
            return;
        };
        let prediction = predict_with(self.models.get(instrument), &row);
        let last = frame.len() - 1;
        if prediction.is_entry(config.confidence) {
            frame.enter_long[last] = true;
        }
        if prediction.is_exit(config.confidence) {
            frame.exit[last] = true;
        }
        debug!(
            instrument,
            confidence = prediction.confidence,
            signal = %prediction.signal,
            "classifier prediction"
        );
    }

    pub fn leverage(&self, instrument: &str, ctx: &TradeContext, latest: Option<&FeatureRow>) -> f64 {
        self.config
            .risk
            .resolve_leverage(instrument, ctx.current_profit, latest)
    }

    pub fn stop_loss(&self, ctx: &TradeContext, latest: Option<&FeatureRow>) -> f64 {
        self.config
            .stoploss
            .resolve_stop_loss(ctx.current_profit, latest)
    }

    pub fn custom_exit(&self, ctx: &TradeContext) -> bool {
        self.config.exit_thresholds.should_exit(ctx.current_profit)
    }

    pub fn minimal_roi(&self, ctx: &TradeContext) -> Option<f64> {
        self.config
            .roi
            .minimal_roi(u64::try_from(ctx.minutes_open()).unwrap_or(0))
    }

    /// Drop the buffer and model held for `instrument`.
    pub fn reset(&mut self, instrument: &str) {
        if let Some(buffers) = &mut self.buffers {
            buffers.reset(instrument);
        }
        self.models.remove(instrument);
    }
}

/// Train on everything except the holdout tail; `None` leaves the model
/// untrained so a later tick retries.
fn train_on_history(
    instrument: &str,
    table: &FeatureTable,
    config: &ClassifierConfig,
) -> Option<ClassifierModel> {
    let rows = table.len().checked_sub(config.holdout)?;
    match ClassifierModel::train(instrument, &table.head(rows), config) {
        Ok(model) => Some(model),
        Err(e) => {
            warn!(instrument, error = %e, "classifier training failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Candle;
    use crate::domain::risk::{ExitThresholds, RiskProfile, RoiLadder, StopLossPolicy};
    use crate::domain::rule_parser::{parse, parse_feature};
    use crate::domain::strategy::{BufferConfig, StartupGate, Timeframe};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> Series {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Series::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| Candle {
                    timestamp: start + chrono::Duration::minutes(i as i64),
                    open: c,
                    high: c * 1.001,
                    low: c * 0.999,
                    close: c,
                    volume: 100.0,
                })
                .collect(),
        )
        .unwrap()
    }

    fn config(entry: &str, exit: &str) -> StrategyConfig {
        StrategyConfig {
            name: "test".into(),
            description: String::new(),
            timeframe: Timeframe::from_minutes(1),
            startup_candles: 3,
            startup_gate: StartupGate::Entry,
            max_open_trades: 1,
            features: vec![parse_feature("sma_2", "SMA(close, 2)").unwrap()],
            entry: Some(parse(entry).unwrap()),
            exit: Some(parse(exit).unwrap()),
            risk: RiskProfile::flat(3.0).unwrap(),
            stoploss: StopLossPolicy::fixed(-0.05).unwrap(),
            roi: RoiLadder::new([(0, 0.02), (60, 0.01)]),
            trailing: None,
            exit_thresholds: ExitThresholds {
                take_profit: Some(0.1),
                stop: None,
            },
            buffer: None,
            classifier: None,
        }
    }

    fn ctx(profit: f64, minutes: i64) -> TradeContext {
        let entry = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        TradeContext {
            current_profit: profit,
            entry_time: entry,
            current_time: entry + chrono::Duration::minutes(minutes),
            min_rate: 1.0,
            max_rate: 1.0,
        }
    }

    #[test]
    fn rejects_unknown_rule_column() {
        let err = StrategyEngine::new(config("ABOVE(ema_9, 1)", "BELOW(close, 1)")).err();
        assert!(matches!(err, Some(SigtraderError::RuleInvalid { .. })));
    }

    #[test]
    fn startup_gate_suppresses_entries_only() {
        let mut engine =
            StrategyEngine::new(config("ABOVE(close, 0)", "ABOVE(close, 0)")).unwrap();
        let frame = engine.populate("BTC", &series(&[1.0, 2.0]));
        assert_eq!(frame.enter_long, vec![false, false]);
        assert_eq!(frame.exit, vec![true, true]);

        let frame = engine.populate("BTC", &series(&[1.0, 2.0, 3.0]));
        assert_eq!(frame.enter_long, vec![true, true, true]);
    }

    #[test]
    fn gate_both_suppresses_exits() {
        let mut cfg = config("ABOVE(close, 0)", "ABOVE(close, 0)");
        cfg.startup_gate = StartupGate::Both;
        let mut engine = StrategyEngine::new(cfg).unwrap();
        let frame = engine.populate("BTC", &series(&[1.0, 2.0]));
        assert!(frame.exit_rows().is_empty());
    }

    #[test]
    fn buffer_momentum_on_last_row() {
        let mut cfg = config("ABOVE(buffer_momentum, 0.01)", "BELOW(close, 0)");
        cfg.buffer = Some(BufferConfig::new(3));
        let mut engine = StrategyEngine::new(cfg).unwrap();
        let frame = engine.populate("BTC", &series(&[100.0, 101.0, 103.0]));
        let col = frame.table.column("buffer_momentum").unwrap();
        assert_eq!(col[0], None);
        assert_relative_eq!(col[2].unwrap(), 0.03);
        assert_eq!(frame.enter_long, vec![false, false, true]);
    }

    #[test]
    fn buffer_column_may_not_shadow_features() {
        let mut cfg = config("ABOVE(close, 0)", "BELOW(close, 0)");
        cfg.buffer = Some(BufferConfig {
            size: 3,
            column: "sma_2".into(),
        });
        assert!(StrategyEngine::new(cfg).is_err());
    }

    #[test]
    fn risk_queries() {
        let engine = StrategyEngine::new(config("ABOVE(close, 0)", "BELOW(close, 0)")).unwrap();
        assert_relative_eq!(engine.leverage("BTC", &ctx(0.0, 0), None), 3.0);
        assert_relative_eq!(engine.stop_loss(&ctx(0.0, 0), None), -0.05);
        assert!(engine.custom_exit(&ctx(0.2, 0)));
        assert!(!engine.custom_exit(&ctx(0.05, 0)));
        assert_eq!(engine.minimal_roi(&ctx(0.0, 90)), Some(0.01));
        assert_eq!(engine.minimal_roi(&ctx(0.0, -5)), Some(0.02));
    }

    #[test]
    fn classifier_retries_until_trained() {
        let mut cfg = config("BELOW(close, 0)", "BELOW(close, 0)");
        cfg.entry = None;
        cfg.features = vec![parse_feature("ret", "PCT_CHANGE(close, 1)").unwrap()];
        cfg.classifier = Some(ClassifierConfig::new(vec!["ret".into()]));
        let mut engine = StrategyEngine::new(cfg).unwrap();

        let closes: Vec<f64> = (0..200)
            .map(|i| 100.0 * (1.0 + 0.01 * (i as f64 * 0.3).sin()))
            .collect();
        // too short to train: 50 - 10 holdout leaves fewer than 100 rows
        engine.populate("BTC", &series(&closes[..50]));
        assert!(!engine.has_model("BTC"));

        let frame = engine.populate("BTC", &series(&closes));
        assert!(engine.has_model("BTC"));
        assert_eq!(frame.entry_rows().iter().filter(|&&i| i + 1 < frame.len()).count(), 0);

        engine.reset("BTC");
        assert!(!engine.has_model("BTC"));
    }
}
