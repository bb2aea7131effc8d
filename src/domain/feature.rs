//! Feature specifications: named derived columns computed by the pipeline.

use crate::domain::indicator::{IndicatorField, IndicatorType};
use crate::domain::ohlcv::PriceField;
use std::fmt;

/// Column names that every feature table carries and no feature may reuse.
pub const PASSTHROUGH_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Where a feature reads its input from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Price(PriceField),
    Feature(String),
}

impl Source {
    /// `close`, `volume`, ... map to price fields; anything else names a feature.
    pub fn from_name(name: &str) -> Self {
        match PriceField::from_name(name) {
            Some(field) => Source::Price(field),
            None => Source::Feature(name.to_string()),
        }
    }

    pub fn feature_name(&self) -> Option<&str> {
        match self {
            Source::Feature(name) => Some(name),
            Source::Price(_) => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Price(field) => write!(f, "{}", field.name()),
            Source::Feature(name) => write!(f, "{}", name),
        }
    }
}

/// Market regime codes as stored in a regime column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Regime {
    Ranging,
    Volatile,
    Trending,
}

impl Regime {
    pub fn code(self) -> f64 {
        match self {
            Regime::Ranging => 0.0,
            Regime::Volatile => 1.0,
            Regime::Trending => 2.0,
        }
    }

    pub fn from_code(value: f64) -> Option<Self> {
        if value == 0.0 {
            Some(Regime::Ranging)
        } else if value == 1.0 {
            Some(Regime::Volatile)
        } else if value == 2.0 {
            Some(Regime::Trending)
        } else {
            None
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "RANGING" => Some(Regime::Ranging),
            "VOLATILE" => Some(Regime::Volatile),
            "TRENDING" => Some(Regime::Trending),
            _ => None,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Regime::Ranging => "RANGING",
            Regime::Volatile => "VOLATILE",
            Regime::Trending => "TRENDING",
        };
        write!(f, "{}", word)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureKind {
    /// A series-math function. `source` is `None` for indicators that read
    /// whole candles (ATR, NATR, ADX, SAR, VWAP).
    Indicator {
        indicator: IndicatorType,
        field: IndicatorField,
        source: Option<Source>,
    },
    /// `numerator / denominator`
    Ratio { numerator: Source, denominator: Source },
    /// `(left - right) / scale`, optionally absolute. No scale divides by 1.
    Spread {
        left: Source,
        right: Source,
        scale: Option<Source>,
        absolute: bool,
    },
    /// `x[i] - x[i-lag]`
    Change { source: Source, lag: usize },
    /// `x[i-lag]`
    Lag { source: Source, lag: usize },
    /// `(value - lower) / (upper - lower)`
    Position {
        value: Source,
        lower: Source,
        upper: Source,
    },
    /// Trending if trend strength exceeds the threshold; otherwise volatile
    /// if volatility exceeds its rolling mean times the factor; otherwise ranging.
    Regime {
        trend_strength: Source,
        volatility: Source,
        trend_threshold: f64,
        window: usize,
        volatility_factor: f64,
    },
}

impl FeatureKind {
    /// Every source this feature reads.
    pub fn inputs(&self) -> Vec<&Source> {
        match self {
            FeatureKind::Indicator { source, .. } => source.iter().collect(),
            FeatureKind::Ratio {
                numerator,
                denominator,
            } => vec![numerator, denominator],
            FeatureKind::Spread {
                left, right, scale, ..
            } => {
                let mut v = vec![left, right];
                v.extend(scale.iter());
                v
            }
            FeatureKind::Change { source, .. } | FeatureKind::Lag { source, .. } => vec![source],
            FeatureKind::Position {
                value,
                lower,
                upper,
            } => vec![value, lower, upper],
            FeatureKind::Regime {
                trend_strength,
                volatility,
                ..
            } => vec![trend_strength, volatility],
        }
    }

    /// Leading undefined rows this step adds on top of its inputs' warm-up.
    pub fn own_warmup(&self) -> usize {
        match self {
            FeatureKind::Indicator { indicator, .. } => indicator.warmup(),
            FeatureKind::Change { lag, .. } | FeatureKind::Lag { lag, .. } => *lag,
            FeatureKind::Regime { window, .. } => window.saturating_sub(1),
            FeatureKind::Ratio { .. } | FeatureKind::Spread { .. } | FeatureKind::Position { .. } => 0,
        }
    }

    /// Parameter checks that do not depend on other features.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            FeatureKind::Indicator {
                indicator,
                field,
                source,
            } => {
                indicator.validate()?;
                if !indicator.has_field(*field) {
                    return Err(format!("{} has no output {:?}", indicator, field));
                }
                match (indicator.uses_candles(), source) {
                    (true, Some(_)) => Err(format!("{} reads candles and takes no source", indicator)),
                    (false, None) => Err(format!("{} needs a source column", indicator)),
                    _ => Ok(()),
                }
            }
            FeatureKind::Change { lag, .. } | FeatureKind::Lag { lag, .. } if *lag == 0 => {
                Err("lag must be at least 1".into())
            }
            FeatureKind::Regime {
                trend_threshold,
                window,
                volatility_factor,
                ..
            } => {
                if *window == 0 {
                    Err("regime window must be at least 1".into())
                } else if !trend_threshold.is_finite() || !volatility_factor.is_finite() {
                    Err("regime thresholds must be finite".into())
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Shorthand for a single-line indicator over a source.
    pub fn indicator(name: impl Into<String>, indicator: IndicatorType, source: Source) -> Self {
        Self::new(
            name,
            FeatureKind::Indicator {
                indicator,
                field: IndicatorField::Value,
                source: Some(source),
            },
        )
    }
}
