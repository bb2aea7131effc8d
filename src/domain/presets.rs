//! Named strategy presets.
//!
//! Each preset is a complete [`StrategyConfig`] written in the rule and
//! feature DSLs. Exit rules keep the exact grouping of their source
//! strategies, including the volume guards.

use crate::domain::classifier::ClassifierConfig;
use crate::domain::error::SigtraderError;
use crate::domain::feature::{FeatureSpec, Regime};
use crate::domain::risk::{
    Adjustment, AdjustmentStage, ExitThresholds, ProfitLock, RiskProfile, RoiLadder,
    StopLossPolicy, TrailingStop, Trigger,
};
use crate::domain::rule::Rule;
use crate::domain::rule_parser::{parse, parse_feature};
use crate::domain::strategy::{BufferConfig, StartupGate, StrategyConfig, Timeframe};
use std::collections::BTreeMap;

pub const PRESET_NAMES: [&str; 12] = [
    "trend_v1",
    "high_freq_v1",
    "mean_rev_v1",
    "adaptive_high_risk",
    "ultra_momentum",
    "buy_hold",
    "buy_hold_v2",
    "high_leverage",
    "leveraged_hold",
    "nine_second_sniper",
    "ml_v1",
    "ml_v2",
];

pub fn names() -> &'static [&'static str] {
    &PRESET_NAMES
}

pub fn by_name(name: &str) -> Result<StrategyConfig, SigtraderError> {
    match name {
        "trend_v1" => trend_v1(),
        "high_freq_v1" => high_freq_v1(),
        "mean_rev_v1" => mean_rev_v1(),
        "adaptive_high_risk" => adaptive_high_risk(),
        "ultra_momentum" => ultra_momentum(),
        "buy_hold" => buy_hold(),
        "buy_hold_v2" => buy_hold_v2(),
        "high_leverage" => high_leverage(),
        "leveraged_hold" => leveraged_hold(),
        "nine_second_sniper" => nine_second_sniper(),
        "ml_v1" => ml_v1(),
        "ml_v2" => ml_v2(),
        _ => Err(SigtraderError::UnknownPreset {
            name: name.to_string(),
        }),
    }
}

fn features(defs: &[(&str, &str)]) -> Result<Vec<FeatureSpec>, SigtraderError> {
    defs.iter()
        .map(|(name, text)| Ok(parse_feature(name, text)?))
        .collect()
}

fn rule(text: &str) -> Result<Option<Rule>, SigtraderError> {
    Ok(Some(parse(text)?))
}

fn leverage_table(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn trailing(positive: f64, offset: f64) -> Option<TrailingStop> {
    Some(TrailingStop {
        positive,
        offset,
        only_offset_is_reached: true,
    })
}

fn exits(take_profit: f64, stop: f64) -> ExitThresholds {
    ExitThresholds {
        take_profit: Some(take_profit),
        stop: Some(stop),
    }
}

/// Fields shared by every preset; callers override the rest.
fn base(
    name: &str,
    description: &str,
    timeframe_minutes: u32,
    startup_candles: usize,
) -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        name: name.to_string(),
        description: description.to_string(),
        timeframe: Timeframe::from_minutes(timeframe_minutes),
        startup_candles,
        startup_gate: StartupGate::Entry,
        max_open_trades: 1,
        features: Vec::new(),
        entry: None,
        exit: None,
        risk: RiskProfile::flat(1.0)?,
        stoploss: StopLossPolicy::fixed(-0.03)?,
        roi: RoiLadder::new([(0, 0.05)]),
        trailing: None,
        exit_thresholds: ExitThresholds::default(),
        buffer: None,
        classifier: None,
    })
}

const MAJORS: [&str; 5] = [
    "BTC/USDT:USDT",
    "ETH/USDT:USDT",
    "SOL/USDT:USDT",
    "XRP/USDT:USDT",
    "DOGE/USDT:USDT",
];

fn majors(levels: [f64; 5]) -> BTreeMap<String, f64> {
    MAJORS
        .iter()
        .zip(levels)
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn trend_v1() -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        startup_gate: StartupGate::Off,
        features: features(&[
            ("fast_ema", "EMA(close, 12)"),
            ("slow_ema", "EMA(close, 26)"),
            ("rsi", "RSI(close, 14)"),
        ])?,
        entry: rule(
            "AND(CROSS_ABOVE(fast_ema, slow_ema), BELOW(rsi, 70), ABOVE(volume, 0))",
        )?,
        exit: rule(
            "AND(OR(CROSS_BELOW(fast_ema, slow_ema), ABOVE(rsi, 80)), ABOVE(volume, 0))",
        )?,
        ..base("trend_v1", "EMA 12/26 crossover with an RSI filter", 5, 300)?
    })
}

fn high_freq_v1() -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        startup_gate: StartupGate::Off,
        max_open_trades: 10,
        features: features(&[
            ("fast_ema", "EMA(close, 9)"),
            ("slow_ema", "EMA(close, 21)"),
            ("rsi", "RSI(close, 7)"),
            ("adx", "ADX(14)"),
        ])?,
        entry: rule("AND(CROSS_ABOVE(fast_ema, slow_ema), BELOW(rsi, 55), ABOVE(volume, 0))")?,
        exit: rule(
            "AND(OR(CROSS_BELOW(fast_ema, slow_ema), ABOVE(rsi, 70)), ABOVE(volume, 0))",
        )?,
        stoploss: StopLossPolicy::fixed(-0.015)?,
        roi: RoiLadder::new([(0, 0.015), (30, 0.008), (90, 0.004), (180, 0.002), (360, 0.0)]),
        trailing: trailing(0.006, 0.01),
        ..base("high_freq_v1", "Fast EMA 9/21 crossover with tight targets", 5, 300)?
    })
}

fn mean_rev_v1() -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        startup_gate: StartupGate::Off,
        features: features(&[
            ("bb_lower", "BOLLINGER_LOWER(close, 20, 2)"),
            ("bb_middle", "BOLLINGER_MIDDLE(close, 20, 2)"),
            ("bb_upper", "BOLLINGER_UPPER(close, 20, 2)"),
            ("rsi", "RSI(close, 14)"),
            ("bb_position", "POSITION(close, bb_lower, bb_upper)"),
        ])?,
        entry: rule("AND(BELOW(bb_position, 0.05), BELOW(rsi, 35), ABOVE(volume, 0))")?,
        exit: rule("AND(OR(ABOVE(bb_position, 0.95), ABOVE(rsi, 75)), ABOVE(volume, 0))")?,
        ..base("mean_rev_v1", "Bollinger band mean reversion", 5, 300)?
    })
}

fn adaptive_high_risk() -> Result<StrategyConfig, SigtraderError> {
    let risk = RiskProfile::new(
        25.0,
        majors([5.0, 4.0, 3.0, 2.0, 2.0]),
        50.0,
        vec![
            AdjustmentStage::new(vec![
                Adjustment {
                    trigger: Trigger::Any(vec![
                        Trigger::Regime {
                            column: "regime".into(),
                            regimes: vec![Regime::Volatile],
                        },
                        Trigger::FeatureAbove {
                            column: "natr".into(),
                            threshold: 0.03,
                        },
                    ]),
                    multiplier: 0.8,
                },
                Adjustment {
                    trigger: Trigger::Regime {
                        column: "regime".into(),
                        regimes: vec![Regime::Trending],
                    },
                    multiplier: 1.2,
                },
            ]),
            AdjustmentStage::new(vec![
                Adjustment {
                    trigger: Trigger::ProfitAbove(0.05),
                    multiplier: 1.1,
                },
                Adjustment {
                    trigger: Trigger::ProfitBelow(-0.05),
                    multiplier: 0.9,
                },
            ]),
        ],
    )?;

    Ok(StrategyConfig {
        max_open_trades: 3,
        features: features(&[
            ("ema_9", "EMA(close, 9)"),
            ("ema_21", "EMA(close, 21)"),
            ("ema_50", "EMA(close, 50)"),
            ("rsi", "RSI(close, 14)"),
            ("volume_sma", "SMA(volume, 20)"),
            ("volume_ratio", "RATIO(volume, volume_sma)"),
            ("momentum", "PCT_CHANGE(close, 3)"),
            ("volatility", "VOLATILITY(close, 20)"),
            ("trend_strength", "ABS_SPREAD(ema_9, ema_21, close)"),
            ("regime", "REGIME(trend_strength, volatility, 0.005, 50, 1.1)"),
            ("macd", "MACD_LINE(close, 12, 26, 9)"),
            ("macd_signal", "MACD_SIGNAL(close, 12, 26, 9)"),
            ("macd_hist", "MACD_HISTOGRAM(close, 12, 26, 9)"),
            ("bb_upper", "BOLLINGER_UPPER(close, 5, 2)"),
            ("bb_middle", "BOLLINGER_MIDDLE(close, 5, 2)"),
            ("bb_lower", "BOLLINGER_LOWER(close, 5, 2)"),
            ("bb_position", "POSITION(close, bb_lower, bb_upper)"),
            ("natr", "NATR(14)"),
        ])?,
        entry: rule(
            "AND(REGIME(regime, TRENDING), ABOVE(ema_9, ema_21), ABOVE(ema_21, ema_50), \
             ABOVE(rsi, 50), BELOW(rsi, 75), ABOVE(macd, macd_signal), \
             ABOVE(volume_ratio, 1.5), ABOVE(trend_strength, 0.01), ABOVE(momentum, 0.005))",
        )?,
        exit: rule(
            "OR(\
             AND(REGIME(regime, TRENDING), OR(BELOW(ema_9, ema_21), ABOVE(rsi, 90), BELOW(macd, macd_signal))), \
             AND(REGIME(regime, VOLATILE), OR(ABOVE(bb_position, 0.8), ABOVE(rsi, 75), BELOW(macd, macd_signal))), \
             AND(REGIME(regime, RANGING), OR(BELOW(close, bb_middle), ABOVE(rsi, 80), BELOW(macd_hist, macd_hist[1]))))",
        )?,
        risk,
        stoploss: StopLossPolicy::fixed(-0.015)?,
        roi: RoiLadder::new([(0, 0.01), (30, 0.008), (60, 0.005), (120, 0.003)]),
        trailing: trailing(0.03, 0.04),
        exit_thresholds: exits(0.12, -0.025),
        ..base(
            "adaptive_high_risk",
            "Regime-aware trend entries with regime-specific exits",
            1,
            200,
        )?
    })
}

fn ultra_momentum() -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        features: features(&[
            ("rsi", "RSI(close, 14)"),
            ("rsi_6", "RSI(close, 6)"),
            ("volume_sma", "SMA(volume, 20)"),
            ("ema_12", "EMA(close, 12)"),
            ("ema_26", "EMA(close, 26)"),
            ("ema_trend", "SPREAD(ema_12, ema_26, close)"),
            ("momentum", "PCT_CHANGE(close, 3)"),
            ("momentum_6", "PCT_CHANGE(close, 6)"),
            ("atr", "ATR(14)"),
            ("atr_percent", "RATIO(atr, close)"),
            ("volume_ratio", "RATIO(volume, volume_sma)"),
            ("volume_lag_3", "LAG(volume, 3)"),
            ("volume_trend", "RATIO(volume, volume_lag_3)"),
            ("high_5", "MAX(high, 5)"),
            ("close_change", "PCT_CHANGE(close, 3)"),
        ])?,
        entry: rule(
            "AND(ABOVE(ema_trend, 0.002), ABOVE(rsi, 55), BELOW(rsi, 75), BELOW(rsi, 80), \
             ABOVE(momentum, 0.003), ABOVE(volume_ratio, 1.3), BELOW(atr_percent, 0.04))",
        )?,
        exit: rule("OR(BELOW(ema_trend, -0.005), ABOVE(rsi, 80), BELOW(momentum, -0.005))")?,
        risk: RiskProfile::new(25.0, majors([30.0, 30.0, 25.0, 25.0, 25.0]), 30.0, Vec::new())?,
        stoploss: StopLossPolicy::fixed(-0.01)?,
        roi: RoiLadder::new([(0, 0.03), (60, 0.02), (180, 0.015), (360, 0.01)]),
        exit_thresholds: exits(0.025, -0.015),
        ..base("ultra_momentum", "Momentum bursts with volume confirmation", 1, 100)?
    })
}

fn ema_hold_features() -> Result<Vec<FeatureSpec>, SigtraderError> {
    features(&[("ema_20", "EMA(close, 20)"), ("ema_50", "EMA(close, 50)")])
}

fn buy_hold() -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        max_open_trades: 3,
        features: ema_hold_features()?,
        entry: rule("ABOVE(close, ema_50)")?,
        exit: rule("BELOW(close, ema_20)")?,
        risk: RiskProfile::new(3.0, majors([5.0, 5.0, 5.0, 3.0, 3.0]), 5.0, Vec::new())?,
        stoploss: StopLossPolicy::fixed(-0.08)?,
        roi: RoiLadder::new([(0, 0.03), (60, 0.02), (180, 0.015), (360, 0.01), (720, 0.005)]),
        trailing: trailing(0.025, 0.035),
        ..base("buy_hold", "Hold while above the 50 EMA", 1, 100)?
    })
}

fn buy_hold_v2() -> Result<StrategyConfig, SigtraderError> {
    let mut feats = ema_hold_features()?;
    feats.extend(features(&[("atr", "ATR(14)")])?);
    Ok(StrategyConfig {
        max_open_trades: 3,
        features: feats,
        entry: rule("ABOVE(close, ema_50)")?,
        exit: rule("BELOW(close, ema_20)")?,
        risk: RiskProfile::new(
            3.0,
            majors([5.0, 5.0, 5.0, 3.0, 3.0]),
            5.0,
            vec![AdjustmentStage::new(vec![
                Adjustment {
                    trigger: Trigger::ProfitBelow(-0.03),
                    multiplier: 0.5,
                },
                Adjustment {
                    trigger: Trigger::ProfitBelow(-0.02),
                    multiplier: 0.75,
                },
            ])],
        )?,
        stoploss: StopLossPolicy::new(
            -0.05,
            None,
            vec![
                ProfitLock {
                    profit_above: 0.01,
                    max_giveback: 0.02,
                },
                ProfitLock {
                    profit_above: 0.02,
                    max_giveback: 0.0,
                },
            ],
        )?,
        roi: RoiLadder::new([(0, 0.025), (60, 0.018), (180, 0.012), (360, 0.008), (720, 0.005)]),
        trailing: trailing(0.02, 0.028),
        ..base(
            "buy_hold_v2",
            "Trend hold with loss-scaled leverage and a profit ratchet",
            1,
            100,
        )?
    })
}

fn high_leverage() -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        max_open_trades: 2,
        features: ema_hold_features()?,
        entry: rule("ABOVE(close, ema_50)")?,
        exit: rule("BELOW(close, ema_20)")?,
        risk: RiskProfile::new(5.0, majors([10.0, 10.0, 8.0, 5.0, 5.0]), 10.0, Vec::new())?,
        stoploss: StopLossPolicy::fixed(-0.06)?,
        roi: RoiLadder::new([(0, 0.02), (60, 0.015), (180, 0.01), (360, 0.005)]),
        trailing: trailing(0.02, 0.025),
        ..base("high_leverage", "Trend hold at higher leverage", 1, 100)?
    })
}

fn leveraged_hold() -> Result<StrategyConfig, SigtraderError> {
    let mut table = majors([5.0, 5.0, 5.0, 3.0, 3.0]);
    table.extend(leverage_table(&[
        ("LTC/USDT:USDT", 3.0),
        ("LINK/USDT:USDT", 3.0),
        ("UNI/USDT:USDT", 3.0),
        ("ARB/USDT:USDT", 3.0),
        ("OP/USDT:USDT", 3.0),
    ]));
    Ok(StrategyConfig {
        max_open_trades: 3,
        features: features(&[("ema_9", "EMA(close, 9)"), ("ema_21", "EMA(close, 21)")])?,
        entry: rule("ABOVE(ema_9, ema_21)")?,
        exit: rule("BELOW(ema_9, ema_21)")?,
        risk: RiskProfile::new(3.0, table, 5.0, Vec::new())?,
        stoploss: StopLossPolicy::fixed(-0.05)?,
        roi: RoiLadder::new([(0, 0.03), (24, 0.02), (48, 0.015), (72, 0.01), (168, 0.005)]),
        trailing: trailing(0.02, 0.025),
        ..base("leveraged_hold", "Hourly EMA 9/21 trend hold", 60, 20)?
    })
}

fn nine_second_sniper() -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        features: features(&[
            ("sar", "SAR(0.02, 0.2)"),
            ("price_9_ago", "LAG(close, 9)"),
            ("price_change_9", "SPREAD(close, price_9_ago, price_9_ago)"),
            ("volatility_9", "ABS_SPREAD(close, price_9_ago, price_9_ago)"),
            ("volume_sma", "SMA(volume, 10)"),
            ("volume_ratio", "RATIO(volume, volume_sma)"),
        ])?,
        entry: rule(
            "AND(BELOW(close, sar), ABOVE(volatility_9, 0.0015), ABOVE(price_change_9, 0.0008), \
             ABOVE(volume_ratio, 1.4), ABOVE(buffer_momentum, 0.0008))",
        )?,
        exit: rule("OR(ABOVE(close, sar), BELOW(price_change_9, -0.001))")?,
        risk: RiskProfile::new(
            5.0,
            majors([8.0, 6.0, 5.0, 4.0, 4.0]),
            15.0,
            vec![AdjustmentStage::new(vec![Adjustment {
                trigger: Trigger::ProfitAbove(0.005),
                multiplier: 0.5,
            }])],
        )?,
        stoploss: StopLossPolicy::fixed(-0.05)?,
        roi: RoiLadder::new([(0, 0.01), (60, 0.005)]),
        exit_thresholds: exits(0.012, -0.012),
        buffer: Some(BufferConfig::new(9)),
        ..base(
            "nine_second_sniper",
            "Parabolic SAR suppression breakouts with nine-candle momentum",
            1,
            50,
        )?
    })
}

const ML_V1_INPUTS: [&str; 22] = [
    "rsi",
    "rsi_6",
    "rsi_24",
    "ema_trend",
    "ema_trend_2",
    "macd",
    "macd_signal",
    "macd_hist",
    "bb_position",
    "bb_width",
    "atr_percent",
    "volume_ratio",
    "momentum",
    "momentum_6",
    "momentum_3",
    "rsi_trend",
    "volatility",
    "price_position",
    "candle_range",
    "return_1",
    "return_3",
    "return_6",
];

fn ml_v1() -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        startup_gate: StartupGate::Both,
        max_open_trades: 5,
        features: features(&[
            ("rsi", "RSI(close, 14)"),
            ("rsi_6", "RSI(close, 6)"),
            ("rsi_24", "RSI(close, 24)"),
            ("ema_9", "EMA(close, 9)"),
            ("ema_21", "EMA(close, 21)"),
            ("ema_50", "EMA(close, 50)"),
            ("ema_200", "EMA(close, 200)"),
            ("macd", "MACD_LINE(close, 12, 26, 9)"),
            ("macd_signal", "MACD_SIGNAL(close, 12, 26, 9)"),
            ("macd_hist", "MACD_HISTOGRAM(close, 12, 26, 9)"),
            ("bb_upper", "BOLLINGER_UPPER(close, 5, 2)"),
            ("bb_middle", "BOLLINGER_MIDDLE(close, 5, 2)"),
            ("bb_lower", "BOLLINGER_LOWER(close, 5, 2)"),
            ("atr", "ATR(14)"),
            ("volume_sma", "SMA(volume, 20)"),
            ("momentum", "PCT_CHANGE(close, 12)"),
            ("momentum_6", "PCT_CHANGE(close, 6)"),
            ("momentum_3", "PCT_CHANGE(close, 3)"),
            ("ema_trend", "SPREAD(ema_9, ema_50, close)"),
            ("ema_trend_2", "SPREAD(ema_21, ema_50, close)"),
            ("rsi_trend", "CHANGE(rsi, 6)"),
            ("volatility", "VOLATILITY(close, 12)"),
            ("price_position", "SPREAD(close, ema_200, ema_200)"),
            ("candle_range", "SPREAD(high, low, close)"),
            ("return_1", "PCT_CHANGE(close, 1)"),
            ("return_3", "PCT_CHANGE(close, 3)"),
            ("return_6", "PCT_CHANGE(close, 6)"),
            ("volume_ratio", "RATIO(volume, volume_sma)"),
            ("bb_width", "SPREAD(bb_upper, bb_lower, bb_middle)"),
            ("bb_position", "POSITION(close, bb_lower, bb_upper)"),
            ("atr_percent", "RATIO(atr, close)"),
        ])?,
        entry: None,
        exit: rule("ABOVE(rsi, 80)")?,
        stoploss: StopLossPolicy::fixed(-0.02)?,
        roi: RoiLadder::new([(0, 0.02), (60, 0.015), (180, 0.01), (360, 0.005)]),
        trailing: trailing(0.01, 0.015),
        classifier: Some(ClassifierConfig::new(
            ML_V1_INPUTS.iter().map(|s| s.to_string()).collect(),
        )),
        ..base("ml_v1", "Naive Bayes direction classifier with a confidence gate", 5, 500)?
    })
}

fn ml_v2() -> Result<StrategyConfig, SigtraderError> {
    Ok(StrategyConfig {
        startup_gate: StartupGate::Both,
        max_open_trades: 5,
        features: features(&[
            ("rsi", "RSI(close, 14)"),
            ("rsi_6", "RSI(close, 6)"),
            ("ema_9", "EMA(close, 9)"),
            ("ema_21", "EMA(close, 21)"),
            ("ema_50", "EMA(close, 50)"),
            ("ema_trend", "SPREAD(ema_9, ema_21, close)"),
            ("ema_trend_strong", "SPREAD(ema_9, ema_50, close)"),
            ("momentum", "PCT_CHANGE(close, 12)"),
            ("momentum_6", "PCT_CHANGE(close, 6)"),
            ("volatility", "VOLATILITY(close, 12)"),
            ("rsi_trend", "CHANGE(rsi, 6)"),
        ])?,
        entry: rule(
            "AND(ABOVE(ema_9, ema_21), ABOVE(ema_21, ema_50), ABOVE(rsi, 40), BELOW(rsi, 70), \
             ABOVE(rsi_trend, 0), ABOVE(momentum, -0.02))",
        )?,
        exit: rule(
            "OR(BELOW(ema_9, ema_21), BELOW(ema_21, ema_50), ABOVE(rsi, 80), BELOW(rsi_trend, -5))",
        )?,
        stoploss: StopLossPolicy::fixed(-0.025)?,
        roi: RoiLadder::new([(0, 0.025), (60, 0.018), (180, 0.01), (360, 0.005)]),
        trailing: trailing(0.012, 0.018),
        ..base("ml_v2", "Rule-based EMA stack with RSI momentum", 5, 200)?
    })
}
