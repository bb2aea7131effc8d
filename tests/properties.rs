//! Property tests over the series math, rule engine, pipeline, risk resolver
//! and classifier.

mod common;

use common::*;
use proptest::prelude::*;
use sigtrader::domain::classifier::{ClassifierConfig, ClassifierModel, Direction, Prediction};
use sigtrader::domain::feature::{FeatureSpec, Source};
use sigtrader::domain::feature_table::{FeatureRow, FeatureTable};
use sigtrader::domain::indicator::IndicatorType;
use sigtrader::domain::indicator::ema::calculate_ema;
use sigtrader::domain::indicator::extrema::calculate_rolling_max;
use sigtrader::domain::indicator::roc::calculate_pct_change;
use sigtrader::domain::indicator::rsi::calculate_rsi;
use sigtrader::domain::indicator::sma::calculate_sma;
use sigtrader::domain::indicator::stddev::calculate_volatility;
use sigtrader::domain::ohlcv::PriceField;
use sigtrader::domain::pipeline::FeaturePipeline;
use sigtrader::domain::risk::{Adjustment, AdjustmentStage, RiskProfile, Trigger};
use sigtrader::domain::rule_eval::evaluate_series;
use sigtrader::domain::rule_parser::{parse, parse_feature};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn prices() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0f64..1000.0, 0..120)
}

fn leading_undefined(values: &[Option<f64>]) -> usize {
    values.iter().take_while(|v| v.is_none()).count()
}

proptest! {
    #[test]
    fn indicators_preserve_length(values in prices(), period in 0usize..30) {
        let n = values.len();
        prop_assert_eq!(calculate_sma(&values, period).len(), n);
        prop_assert_eq!(calculate_ema(&values, period).len(), n);
        prop_assert_eq!(calculate_rsi(&values, period).len(), n);
        prop_assert_eq!(calculate_volatility(&values, period).len(), n);
        prop_assert_eq!(calculate_rolling_max(&values, period).len(), n);
        prop_assert_eq!(calculate_pct_change(&values, period).len(), n);
    }

    #[test]
    fn ema_follows_its_recursion(values in prices(), period in 1usize..50) {
        let ema = calculate_ema(&values, period);
        let alpha = 2.0 / (period as f64 + 1.0);
        for i in 1..values.len() {
            let (Some(prev), Some(cur)) = (ema[i - 1], ema[i]) else { continue };
            let expected = alpha * values[i] + (1.0 - alpha) * prev;
            prop_assert!((cur - expected).abs() <= 1e-9 * expected.abs().max(1.0));
        }
    }

    #[test]
    fn rsi_is_bounded(values in prices(), period in 1usize..30) {
        for v in calculate_rsi(&values, period).into_iter().flatten() {
            prop_assert!((0.0..=100.0).contains(&v), "rsi {}", v);
        }
    }

    #[test]
    fn warmup_grows_with_period(values in prices(), period in 1usize..30, extra in 0usize..10) {
        let shorter = leading_undefined(&calculate_sma(&values, period));
        let longer = leading_undefined(&calculate_sma(&values, period + extra));
        prop_assert!(longer >= shorter);
        let shorter = leading_undefined(&calculate_rsi(&values, period));
        let longer = leading_undefined(&calculate_rsi(&values, period + extra));
        prop_assert!(longer >= shorter);
    }

    #[test]
    fn crossings_are_exclusive(
        pairs in prop::collection::vec((prop::option::of(-5.0f64..5.0), prop::option::of(-5.0f64..5.0)), 1..80)
    ) {
        let closes = vec![100.0; pairs.len()];
        let (a, b): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        let table = FeatureTable::from_series(&series_from_closes(&closes))
            .with_column("a", a)
            .unwrap()
            .with_column("b", b)
            .unwrap();
        let above = evaluate_series(&parse("CROSS_ABOVE(a, b)").unwrap(), &table);
        let below = evaluate_series(&parse("CROSS_BELOW(a, b)").unwrap(), &table);
        for (i, (x, y)) in above.iter().zip(&below).enumerate() {
            prop_assert!(!(*x && *y), "both crossings at row {}", i);
        }
        prop_assert!(!above[0] && !below[0]);
    }

    #[test]
    fn pipeline_is_idempotent(values in prop::collection::vec(1.0f64..1000.0, 1..150)) {
        let pipeline = FeaturePipeline::new(vec![
            FeatureSpec::indicator("ema", IndicatorType::Ema(9), Source::Price(PriceField::Close)),
            FeatureSpec::indicator("rsi", IndicatorType::Rsi(14), Source::Price(PriceField::Close)),
            parse_feature("spread", "SPREAD(close, ema, ema)").unwrap(),
            parse_feature("vol", "VOLATILITY(close, 10)").unwrap(),
        ])
        .unwrap();
        let series = series_from_closes(&values);
        prop_assert_eq!(pipeline.run(&series), pipeline.run(&series));
    }

    #[test]
    fn leverage_stays_within_cap(
        default in 0.0f64..100.0,
        listed in 0.0f64..100.0,
        cap in 0.0f64..60.0,
        multipliers in prop::collection::vec(0.0f64..5.0, 0..4),
        profit in -1.0f64..1.0,
        regime in 0u8..3,
    ) {
        let mut table = BTreeMap::new();
        table.insert("BTC/USDT:USDT".to_string(), listed);
        let stages = multipliers
            .iter()
            .map(|&m| AdjustmentStage::new(vec![Adjustment {
                trigger: Trigger::Any(vec![
                    Trigger::ProfitAbove(0.0),
                    Trigger::FeatureAbove { column: "regime".into(), threshold: 0.5 },
                ]),
                multiplier: m,
            }]))
            .collect();
        let profile = RiskProfile::new(default, table, cap, stages).unwrap();
        let row = FeatureRow::from_pairs([("regime", f64::from(regime))]);
        for instrument in ["BTC/USDT:USDT", "ETH/USDT:USDT"] {
            let lev = profile.resolve_leverage(instrument, profit, Some(&row));
            prop_assert!((0.0..=cap).contains(&lev), "leverage {} cap {}", lev, cap);
        }
    }
}

fn trained_model() -> &'static ClassifierModel {
    static MODEL: OnceLock<ClassifierModel> = OnceLock::new();
    MODEL.get_or_init(|| {
        let closes = sine_closes(400);
        let table = FeaturePipeline::new(vec![
            parse_feature("momentum", "PCT_CHANGE(close, 3)").unwrap(),
            parse_feature("rsi", "RSI(close, 6)").unwrap(),
        ])
        .unwrap()
        .run(&series_from_closes(&closes));
        let config = ClassifierConfig::new(vec!["momentum".into(), "rsi".into()]);
        ClassifierModel::train("BTC/USDT:USDT", &table, &config).unwrap()
    })
}

proptest! {
    #[test]
    fn non_finite_input_predicts_neutral(
        bad in prop::sample::select(vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY]),
        good in -50.0f64..50.0,
        slot in 0usize..2,
    ) {
        let mut row = FeatureRow::default();
        let names = ["momentum", "rsi"];
        for (i, name) in names.iter().enumerate() {
            row.set(*name, Some(if i == slot { bad } else { good }));
        }
        let prediction = trained_model().predict(&row);
        prop_assert_eq!(prediction, Prediction::NEUTRAL);
        prop_assert_eq!(prediction.confidence, 0.5);
        prop_assert_eq!(prediction.signal, Direction::Flat);
    }
}
