//! Strategy file loading and validation.
//!
//! Reads every section of an INI strategy file through [`ConfigPort`] and
//! builds a [`StrategyConfig`]. Values that are present but malformed are
//! errors; absent optional keys fall back to defaults.
//!
//! ```ini
//! [strategy]
//! name = ema_cross
//! timeframe = 5m
//! startup_candles = 30
//! startup_gate = entry
//! entry = CROSS_ABOVE(fast, slow)
//! exit = CROSS_BELOW(fast, slow)
//!
//! [features]
//! fast = EMA(close, 12)
//! slow = EMA(close, 26)
//!
//! [leverage]
//! default = 3
//! max = 5
//! BTC/USDT:USDT = 5
//!
//! [risk]
//! stage_1 = REGIME(regime, VOLATILE) -> 0.8 | PROFIT_ABOVE(0.05) -> 1.1
//!
//! [stoploss]
//! floor = -0.05
//! ratchet = 0.01 -> 0.02 | 0.02 -> 0
//! ```

use crate::domain::classifier::{
    ClassifierConfig, DEFAULT_CONFIDENCE, DEFAULT_HOLDOUT, DEFAULT_LOOKAHEAD, DEFAULT_MIN_ROWS,
    DEFAULT_THRESHOLD_RETURN,
};
use crate::domain::error::SigtraderError;
use crate::domain::feature::FeatureSpec;
use crate::domain::risk::{
    Adjustment, AdjustmentStage, DynamicStop, ExitThresholds, ProfitLock, RiskProfile, RoiLadder,
    StopLossPolicy, TrailingStop,
};
use crate::domain::rule::Rule;
use crate::domain::rule_parser::{parse, parse_feature, parse_trigger};
use crate::domain::strategy::{BufferConfig, StartupGate, StrategyConfig, Timeframe};
use crate::ports::config_port::ConfigPort;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Separates entries inside one value (`;` and `#` start INI comments).
const ENTRY_SEPARATOR: char = '|';
const ARROW: &str = "->";

pub fn load_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, SigtraderError> {
    let name = required_string(config, "strategy", "name")?;
    let timeframe = match non_empty(config, "strategy", "timeframe") {
        Some(s) => Timeframe::parse(&s)?,
        None => Timeframe::from_minutes(5),
    };
    let startup_gate = match non_empty(config, "strategy", "startup_gate") {
        Some(s) => StartupGate::parse(&s).ok_or_else(|| SigtraderError::ConfigInvalid {
            section: "strategy".into(),
            key: "startup_gate".into(),
            reason: format!("expected off, entry or both, got '{}'", s),
        })?,
        None => StartupGate::default(),
    };

    let strategy = StrategyConfig {
        description: non_empty(config, "strategy", "description").unwrap_or_default(),
        timeframe,
        startup_candles: optional(config, "strategy", "startup_candles")?.unwrap_or(0),
        startup_gate,
        max_open_trades: optional(config, "strategy", "max_open_trades")?.unwrap_or(1),
        features: load_features(config)?,
        entry: load_rule(config, "entry")?,
        exit: load_rule(config, "exit")?,
        risk: load_risk_profile(config)?,
        stoploss: load_stop_loss(config)?,
        roi: load_roi(config)?,
        trailing: load_trailing(config)?,
        exit_thresholds: load_exit_thresholds(config)?,
        buffer: load_buffer(config)?,
        classifier: load_classifier(config)?,
        name,
    };
    strategy.validate()?;
    Ok(strategy)
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, SigtraderError> {
    non_empty(config, section, key).ok_or_else(|| SigtraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn parse_value<T: FromStr>(section: &str, key: &str, raw: &str) -> Result<T, SigtraderError> {
    raw.trim()
        .parse()
        .map_err(|_| SigtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("cannot parse '{}'", raw.trim()),
        })
}

/// `None` when absent; an error when present but unparsable.
fn optional<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, SigtraderError> {
    non_empty(config, section, key)
        .map(|raw| parse_value(section, key, &raw))
        .transpose()
}

fn required<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<T, SigtraderError> {
    let raw = required_string(config, section, key)?;
    parse_value(section, key, &raw)
}

fn load_rule(config: &dyn ConfigPort, key: &str) -> Result<Option<Rule>, SigtraderError> {
    match non_empty(config, "strategy", key) {
        Some(text) => Ok(Some(parse(&text)?)),
        None => Ok(None),
    }
}

fn load_features(config: &dyn ConfigPort) -> Result<Vec<FeatureSpec>, SigtraderError> {
    config
        .keys("features")
        .into_iter()
        .map(|name| {
            let text = required_string(config, "features", &name)?;
            Ok(parse_feature(&name, &text)?)
        })
        .collect()
}

fn load_risk_profile(config: &dyn ConfigPort) -> Result<RiskProfile, SigtraderError> {
    let default: f64 = optional(config, "leverage", "default")?.unwrap_or(1.0);
    let max: f64 = optional(config, "leverage", "max")?.unwrap_or(default);

    let mut table = BTreeMap::new();
    for key in config.keys("leverage") {
        if key == "default" || key == "max" {
            continue;
        }
        table.insert(key.clone(), required(config, "leverage", &key)?);
    }

    RiskProfile::new(default, table, max, load_stages(config)?)
}

/// `[risk]` keys are `stage_<n>`, applied in ascending `n`.
fn load_stages(config: &dyn ConfigPort) -> Result<Vec<AdjustmentStage>, SigtraderError> {
    let mut numbered = Vec::new();
    for key in config.keys("risk") {
        let index: usize = key
            .strip_prefix("stage_")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| SigtraderError::ConfigInvalid {
                section: "risk".into(),
                key: key.clone(),
                reason: "keys must be named stage_<n>".into(),
            })?;
        numbered.push((index, key));
    }
    numbered.sort();

    numbered
        .into_iter()
        .map(|(_, key)| {
            let text = required_string(config, "risk", &key)?;
            let adjustments = split_entries(&text)
                .map(|entry| {
                    let (trigger, multiplier) = split_arrow("risk", &key, entry)?;
                    Ok(Adjustment {
                        trigger: parse_trigger(trigger)?,
                        multiplier: parse_value("risk", &key, multiplier)?,
                    })
                })
                .collect::<Result<Vec<_>, SigtraderError>>()?;
            Ok(AdjustmentStage::new(adjustments))
        })
        .collect()
}

fn split_entries(text: &str) -> impl Iterator<Item = &str> {
    text.split(ENTRY_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn split_arrow<'a>(
    section: &str,
    key: &str,
    entry: &'a str,
) -> Result<(&'a str, &'a str), SigtraderError> {
    entry
        .rsplit_once(ARROW)
        .map(|(l, r)| (l.trim(), r.trim()))
        .ok_or_else(|| SigtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("expected '<left> -> <right>', got '{}'", entry),
        })
}

fn load_stop_loss(config: &dyn ConfigPort) -> Result<StopLossPolicy, SigtraderError> {
    let floor: f64 = required(config, "stoploss", "floor")?;

    let dynamic = match non_empty(config, "stoploss", "atr_column") {
        Some(column) => Some(DynamicStop {
            column,
            multiplier: optional(config, "stoploss", "atr_multiplier")?.unwrap_or(1.0),
        }),
        None => None,
    };

    let ratchet = match non_empty(config, "stoploss", "ratchet") {
        Some(text) => split_entries(&text)
            .map(|entry| {
                let (above, giveback) = split_arrow("stoploss", "ratchet", entry)?;
                Ok(ProfitLock {
                    profit_above: parse_value("stoploss", "ratchet", above)?,
                    max_giveback: parse_value("stoploss", "ratchet", giveback)?,
                })
            })
            .collect::<Result<Vec<_>, SigtraderError>>()?,
        None => Vec::new(),
    };

    StopLossPolicy::new(floor, dynamic, ratchet)
}

/// `[roi]` maps minutes since entry to the minimum return.
fn load_roi(config: &dyn ConfigPort) -> Result<RoiLadder, SigtraderError> {
    let steps = config
        .keys("roi")
        .into_iter()
        .map(|key| {
            let minutes: u64 = parse_value("roi", &key, &key)?;
            let roi: f64 = required(config, "roi", &key)?;
            Ok((minutes, roi))
        })
        .collect::<Result<Vec<_>, SigtraderError>>()?;
    Ok(RoiLadder::new(steps))
}

fn load_trailing(config: &dyn ConfigPort) -> Result<Option<TrailingStop>, SigtraderError> {
    if !config.has_section("trailing") {
        return Ok(None);
    }
    let trailing = TrailingStop {
        positive: required(config, "trailing", "positive")?,
        offset: required(config, "trailing", "offset")?,
        only_offset_is_reached: config.get_bool("trailing", "only_offset_is_reached", true),
    };
    trailing.validate()?;
    Ok(Some(trailing))
}

fn load_exit_thresholds(config: &dyn ConfigPort) -> Result<ExitThresholds, SigtraderError> {
    Ok(ExitThresholds {
        take_profit: optional(config, "exit", "take_profit")?,
        stop: optional(config, "exit", "stop_loss")?,
    })
}

fn load_buffer(config: &dyn ConfigPort) -> Result<Option<BufferConfig>, SigtraderError> {
    if !config.has_section("buffer") {
        return Ok(None);
    }
    let mut buffer = BufferConfig::new(required(config, "buffer", "size")?);
    if let Some(column) = non_empty(config, "buffer", "column") {
        buffer.column = column;
    }
    Ok(Some(buffer))
}

fn load_classifier(config: &dyn ConfigPort) -> Result<Option<ClassifierConfig>, SigtraderError> {
    if !config.has_section("classifier") {
        return Ok(None);
    }
    let features = required_string(config, "classifier", "features")?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let classifier = ClassifierConfig {
        features,
        lookahead: optional(config, "classifier", "lookahead")?.unwrap_or(DEFAULT_LOOKAHEAD),
        threshold_return: optional(config, "classifier", "threshold")?
            .unwrap_or(DEFAULT_THRESHOLD_RETURN),
        confidence: optional(config, "classifier", "confidence")?.unwrap_or(DEFAULT_CONFIDENCE),
        holdout: optional(config, "classifier", "holdout")?.unwrap_or(DEFAULT_HOLDOUT),
        min_rows: optional(config, "classifier", "min_rows")?.unwrap_or(DEFAULT_MIN_ROWS),
    };
    classifier.validate()?;
    Ok(Some(classifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::feature::Regime;
    use crate::domain::feature_table::FeatureRow;
    use crate::domain::risk::Trigger;
    use approx::assert_relative_eq;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const MINIMAL: &str = "[strategy]\nname = x\nentry = ABOVE(close, 1)\n\n[stoploss]\nfloor = -0.05\n";

    fn load(content: &str) -> Result<StrategyConfig, SigtraderError> {
        load_strategy_config(&make_config(content))
    }

    #[test]
    fn full_strategy_file_loads() {
        let strategy = load(
            r#"
[strategy]
name = ema_cross
description = EMA crossover
timeframe = 1h
startup_candles = 30
startup_gate = both
max_open_trades = 3
entry = CROSS_ABOVE(fast, slow)
exit = CROSS_BELOW(fast, slow)

[features]
fast = EMA(close, 12)
slow = EMA(close, 26)

[leverage]
default = 3
max = 10
BTC/USDT:USDT = 5

[risk]
stage_2 = PROFIT_ABOVE(0.05) -> 1.1
stage_1 = REGIME(regime, VOLATILE) -> 0.8 | FEATURE_ABOVE(natr, 0.03) -> 0.9

[stoploss]
floor = -0.05
atr_column = natr
atr_multiplier = 2
ratchet = 0.02 -> 0 | 0.01 -> 0.02

[roi]
0 = 0.05
30 = 0.02

[trailing]
positive = 0.02
offset = 0.025
only_offset_is_reached = false

[exit]
take_profit = 0.12
stop_loss = -0.025

[buffer]
size = 9

[classifier]
features = fast, slow
confidence = 0.6
"#,
        )
        .unwrap();

        assert_eq!(strategy.name, "ema_cross");
        assert_eq!(strategy.timeframe.minutes(), 60);
        assert_eq!(strategy.startup_candles, 30);
        assert_eq!(strategy.startup_gate, StartupGate::Both);
        assert_eq!(strategy.max_open_trades, 3);
        let names: Vec<&str> = strategy.features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["fast", "slow"]);
        assert!(strategy.entry.is_some() && strategy.exit.is_some());

        assert_eq!(strategy.risk.base_leverage("BTC/USDT:USDT"), 5.0);
        assert_eq!(strategy.risk.base_leverage("DOGE/USDT:USDT"), 3.0);
        assert_eq!(strategy.risk.max_leverage(), 10.0);
        let stages = strategy.risk.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(
            stages[0].adjustments[0].trigger,
            Trigger::Regime {
                column: "regime".into(),
                regimes: vec![Regime::Volatile],
            }
        );
        assert_eq!(stages[1].adjustments[0].multiplier, 1.1);

        assert_eq!(strategy.stoploss.floor(), -0.05);
        assert_eq!(strategy.stoploss.ratchet()[0].profit_above, 0.01);
        let row = FeatureRow::from_pairs([("natr", 0.01)]);
        assert_relative_eq!(strategy.stoploss.resolve_stop_loss(0.0, Some(&row)), -0.02);

        assert_eq!(strategy.roi.minimal_roi(45), Some(0.02));
        let trailing = strategy.trailing.unwrap();
        assert!(!trailing.only_offset_is_reached);
        assert_eq!(strategy.exit_thresholds.take_profit, Some(0.12));
        assert_eq!(strategy.buffer.unwrap().size, 9);
        let classifier = strategy.classifier.unwrap();
        assert_eq!(classifier.features, vec!["fast", "slow"]);
        assert_eq!(classifier.confidence, 0.6);
        assert_eq!(classifier.lookahead, DEFAULT_LOOKAHEAD);
    }

    #[test]
    fn minimal_strategy_uses_defaults() {
        let strategy = load(MINIMAL).unwrap();
        assert_eq!(strategy.timeframe.minutes(), 5);
        assert_eq!(strategy.startup_gate, StartupGate::Entry);
        assert_eq!(strategy.max_open_trades, 1);
        assert_eq!(strategy.risk.base_leverage("ANY"), 1.0);
        assert!(strategy.roi.is_empty());
        assert!(strategy.trailing.is_none());
        assert!(strategy.buffer.is_none());
        assert!(strategy.classifier.is_none());
    }

    #[test]
    fn missing_name_fails() {
        let err = load("[strategy]\nentry = ABOVE(close, 1)\n[stoploss]\nfloor = -0.05\n")
            .unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigMissing { key, .. } if key == "name"));
    }

    #[test]
    fn missing_stoploss_floor_fails() {
        let err = load("[strategy]\nname = x\nentry = ABOVE(close, 1)\n").unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigMissing { section, .. } if section == "stoploss"));
    }

    #[test]
    fn malformed_number_fails() {
        let err = load(&format!("{}max_open_trades = lots\n", MINIMAL.replace("[stoploss]\nfloor = -0.05\n", "")))
            .unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigInvalid { key, .. } if key == "max_open_trades"));
    }

    #[test]
    fn bad_rule_is_a_parse_error() {
        let err = load("[strategy]\nname = x\nentry = ABOVE(close 1)\n[stoploss]\nfloor = -0.05\n")
            .unwrap_err();
        assert!(matches!(err, SigtraderError::RuleParse(_)));
    }

    #[test]
    fn bad_startup_gate_fails() {
        let err = load(&MINIMAL.replace("name = x\n", "name = x\nstartup_gate = later\n"))
            .unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigInvalid { key, .. } if key == "startup_gate"));
    }

    #[test]
    fn risk_keys_must_be_numbered_stages() {
        let err = load(&format!("{}[risk]\nfirst = PROFIT_ABOVE(0.1) -> 2\n", MINIMAL)).unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigInvalid { section, .. } if section == "risk"));
    }

    #[test]
    fn risk_entry_needs_arrow() {
        let err = load(&format!("{}[risk]\nstage_1 = PROFIT_ABOVE(0.1) 2\n", MINIMAL)).unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigInvalid { section, .. } if section == "risk"));
    }

    #[test]
    fn positive_floor_fails() {
        let err = load(&MINIMAL.replace("floor = -0.05", "floor = 0.05")).unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigInvalid { key, .. } if key == "floor"));
    }

    #[test]
    fn trailing_offset_below_positive_fails() {
        let err = load(&format!(
            "{}[trailing]\npositive = 0.03\noffset = 0.01\n",
            MINIMAL
        ))
        .unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigInvalid { section, .. } if section == "trailing"));
    }

    #[test]
    fn classifier_without_entry_is_allowed() {
        let strategy = load(
            "[strategy]\nname = ml\n[features]\nrsi = RSI(close, 14)\n[stoploss]\nfloor = -0.02\n[classifier]\nfeatures = rsi\n",
        )
        .unwrap();
        assert!(strategy.entry.is_none());
        assert!(strategy.classifier.is_some());
    }

    #[test]
    fn no_entry_and_no_classifier_fails() {
        let err = load("[strategy]\nname = x\n[stoploss]\nfloor = -0.05\n").unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigMissing { key, .. } if key == "entry"));
    }
}
