//! Risk parameter resolution: leverage, stop-loss, take-profit exits, ROI ladder.
//!
//! Everything here is a pure function of a profile, the trade state and the
//! latest feature row. Undefined features never trigger an adjustment.

use crate::domain::error::SigtraderError;
use crate::domain::feature::Regime;
use crate::domain::feature_table::FeatureRow;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::debug;

/// Host-supplied state of an open trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeContext {
    pub current_profit: f64,
    pub entry_time: NaiveDateTime,
    pub current_time: NaiveDateTime,
    pub min_rate: f64,
    pub max_rate: f64,
}

impl TradeContext {
    /// Whole minutes since entry, never negative.
    pub fn minutes_open(&self) -> i64 {
        (self.current_time - self.entry_time).num_minutes().max(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Regime { column: String, regimes: Vec<Regime> },
    FeatureAbove { column: String, threshold: f64 },
    FeatureBelow { column: String, threshold: f64 },
    ProfitAbove(f64),
    ProfitBelow(f64),
    Any(Vec<Trigger>),
}

impl Trigger {
    pub fn matches(&self, current_profit: f64, row: Option<&FeatureRow>) -> bool {
        match self {
            Trigger::Regime { column, regimes } => row
                .and_then(|r| r.get(column))
                .and_then(Regime::from_code)
                .is_some_and(|regime| regimes.contains(&regime)),
            Trigger::FeatureAbove { column, threshold } => row
                .and_then(|r| r.get(column))
                .is_some_and(|v| v > *threshold),
            Trigger::FeatureBelow { column, threshold } => row
                .and_then(|r| r.get(column))
                .is_some_and(|v| v < *threshold),
            Trigger::ProfitAbove(t) => current_profit > *t,
            Trigger::ProfitBelow(t) => current_profit < *t,
            Trigger::Any(triggers) => triggers.iter().any(|t| t.matches(current_profit, row)),
        }
    }

    /// Feature columns the trigger reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Trigger::Regime { column, .. }
            | Trigger::FeatureAbove { column, .. }
            | Trigger::FeatureBelow { column, .. } => vec![column.as_str()],
            Trigger::ProfitAbove(_) | Trigger::ProfitBelow(_) => Vec::new(),
            Trigger::Any(triggers) => triggers.iter().flat_map(Trigger::columns).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub trigger: Trigger,
    pub multiplier: f64,
}

/// Ordered adjustments; the first one whose trigger matches applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjustmentStage {
    pub adjustments: Vec<Adjustment>,
}

impl AdjustmentStage {
    pub fn new(adjustments: Vec<Adjustment>) -> Self {
        Self { adjustments }
    }

    fn multiplier(&self, current_profit: f64, row: Option<&FeatureRow>) -> f64 {
        self.adjustments
            .iter()
            .find(|a| a.trigger.matches(current_profit, row))
            .map(|a| a.multiplier)
            .unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskProfile {
    default_leverage: f64,
    leverage_table: BTreeMap<String, f64>,
    max_leverage: f64,
    stages: Vec<AdjustmentStage>,
}

impl RiskProfile {
    pub fn new(
        default_leverage: f64,
        leverage_table: BTreeMap<String, f64>,
        max_leverage: f64,
        stages: Vec<AdjustmentStage>,
    ) -> Result<Self, SigtraderError> {
        check_non_negative("default", default_leverage)?;
        check_non_negative("max", max_leverage)?;
        for (instrument, value) in &leverage_table {
            check_non_negative(instrument, *value)?;
        }
        for stage in &stages {
            for adj in &stage.adjustments {
                if !adj.multiplier.is_finite() || adj.multiplier < 0.0 {
                    return Err(SigtraderError::ConfigInvalid {
                        section: "risk".into(),
                        key: "multiplier".into(),
                        reason: format!("must be a non-negative number, got {}", adj.multiplier),
                    });
                }
            }
        }
        Ok(Self {
            default_leverage,
            leverage_table,
            max_leverage,
            stages,
        })
    }

    /// A fixed leverage for every instrument.
    pub fn flat(leverage: f64) -> Result<Self, SigtraderError> {
        Self::new(leverage, BTreeMap::new(), leverage, Vec::new())
    }

    pub fn default_leverage(&self) -> f64 {
        self.default_leverage
    }

    pub fn max_leverage(&self) -> f64 {
        self.max_leverage
    }

    pub fn leverage_table(&self) -> &BTreeMap<String, f64> {
        &self.leverage_table
    }

    pub fn stages(&self) -> &[AdjustmentStage] {
        &self.stages
    }

    /// Table entry for the instrument, or the default when it has none.
    pub fn base_leverage(&self, instrument: &str) -> f64 {
        self.leverage_table
            .get(instrument)
            .copied()
            .unwrap_or(self.default_leverage)
    }

    pub fn resolve_leverage(
        &self,
        instrument: &str,
        current_profit: f64,
        latest_row: Option<&FeatureRow>,
    ) -> f64 {
        let base = self.base_leverage(instrument);
        let adjusted = self
            .stages
            .iter()
            .fold(base, |lev, stage| lev * stage.multiplier(current_profit, latest_row));
        let clamped = if adjusted.is_finite() {
            adjusted.clamp(0.0, self.max_leverage)
        } else {
            base.clamp(0.0, self.max_leverage)
        };
        debug!(instrument, base, adjusted, clamped, "resolved leverage");
        clamped
    }
}

fn check_non_negative(key: &str, value: f64) -> Result<(), SigtraderError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SigtraderError::ConfigInvalid {
            section: "leverage".into(),
            key: key.into(),
            reason: format!("must be a non-negative number, got {}", value),
        })
    }
}

/// Stop distance derived from a volatility column, e.g. ATR%.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicStop {
    pub column: String,
    pub multiplier: f64,
}

/// Once profit exceeds `profit_above`, the stop may give back at most `max_giveback`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitLock {
    pub profit_above: f64,
    pub max_giveback: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopLossPolicy {
    floor: f64,
    dynamic: Option<DynamicStop>,
    ratchet: Vec<ProfitLock>,
}

impl StopLossPolicy {
    /// `floor` is a negative fraction such as `-0.03`. Ratchet bands are
    /// sorted by profit threshold.
    pub fn new(
        floor: f64,
        dynamic: Option<DynamicStop>,
        mut ratchet: Vec<ProfitLock>,
    ) -> Result<Self, SigtraderError> {
        if !floor.is_finite() || floor > 0.0 {
            return Err(SigtraderError::ConfigInvalid {
                section: "stoploss".into(),
                key: "floor".into(),
                reason: format!("must be a negative fraction, got {}", floor),
            });
        }
        if let Some(d) = &dynamic {
            if !d.multiplier.is_finite() || d.multiplier <= 0.0 {
                return Err(SigtraderError::ConfigInvalid {
                    section: "stoploss".into(),
                    key: "atr_multiplier".into(),
                    reason: format!("must be positive, got {}", d.multiplier),
                });
            }
        }
        for lock in &ratchet {
            if !lock.profit_above.is_finite()
                || !lock.max_giveback.is_finite()
                || lock.max_giveback < 0.0
            {
                return Err(SigtraderError::ConfigInvalid {
                    section: "stoploss".into(),
                    key: "ratchet".into(),
                    reason: format!(
                        "band {} -> {} must be finite with a non-negative giveback",
                        lock.profit_above, lock.max_giveback
                    ),
                });
            }
        }
        ratchet.sort_by(|a, b| a.profit_above.total_cmp(&b.profit_above));
        Ok(Self {
            floor,
            dynamic,
            ratchet,
        })
    }

    pub fn fixed(floor: f64) -> Result<Self, SigtraderError> {
        Self::new(floor, None, Vec::new())
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn dynamic(&self) -> Option<&DynamicStop> {
        self.dynamic.as_ref()
    }

    pub fn ratchet(&self) -> &[ProfitLock] {
        &self.ratchet
    }

    pub fn resolve_stop_loss(&self, current_profit: f64, latest_row: Option<&FeatureRow>) -> f64 {
        let mut stop = self.floor;

        if let Some(dynamic) = &self.dynamic {
            if let Some(v) = latest_row.and_then(|r| r.get(&dynamic.column)) {
                // never looser than the floor
                stop = (-(v.abs() * dynamic.multiplier)).max(self.floor);
            }
        }

        if let Some(lock) = self
            .ratchet
            .iter()
            .rev()
            .find(|lock| current_profit > lock.profit_above)
        {
            stop = stop.max(-lock.max_giveback);
        }

        stop.min(0.0)
    }
}

/// Take-profit and hard-stop thresholds checked on every tick of an open trade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitThresholds {
    pub take_profit: Option<f64>,
    pub stop: Option<f64>,
}

impl ExitThresholds {
    pub fn should_exit(&self, current_profit: f64) -> bool {
        self.take_profit.is_some_and(|tp| current_profit > tp)
            || self.stop.is_some_and(|s| current_profit < s)
    }
}

/// Minimum acceptable return by minutes since entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoiLadder {
    steps: BTreeMap<u64, f64>,
}

impl RoiLadder {
    pub fn new<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = (u64, f64)>,
    {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    pub fn steps(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.steps.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step with the largest key not exceeding `minutes`.
    pub fn minimal_roi(&self, minutes: u64) -> Option<f64> {
        self.steps.range(..=minutes).next_back().map(|(_, v)| *v)
    }
}

/// Trailing stop settings passed through to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStop {
    pub positive: f64,
    pub offset: f64,
    pub only_offset_is_reached: bool,
}

impl TrailingStop {
    pub fn validate(&self) -> Result<(), SigtraderError> {
        if !(self.positive.is_finite() && self.positive > 0.0) {
            return Err(SigtraderError::ConfigInvalid {
                section: "trailing".into(),
                key: "positive".into(),
                reason: format!("must be positive, got {}", self.positive),
            });
        }
        if !self.offset.is_finite() || self.offset < self.positive {
            return Err(SigtraderError::ConfigInvalid {
                section: "trailing".into(),
                key: "offset".into(),
                reason: format!(
                    "must be at least the trailing distance {}, got {}",
                    self.positive, self.offset
                ),
            });
        }
        Ok(())
    }
}
