//! Strategy configuration: one record drives the whole evaluation engine.

use crate::domain::classifier::ClassifierConfig;
use crate::domain::error::SigtraderError;
use crate::domain::feature::FeatureSpec;
use crate::domain::risk::{ExitThresholds, RiskProfile, RoiLadder, StopLossPolicy, TrailingStop};
use crate::domain::rule::Rule;
use std::fmt;

/// Column that carries the price-buffer momentum on the latest row.
pub const BUFFER_MOMENTUM_COLUMN: &str = "buffer_momentum";

/// Candle interval, e.g. `5m` or `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    minutes: u32,
}

impl Timeframe {
    pub fn from_minutes(minutes: u32) -> Self {
        Self { minutes }
    }

    pub fn minutes(self) -> u32 {
        self.minutes
    }

    /// `<n>m`, `<n>h` or `<n>d`.
    pub fn parse(s: &str) -> Result<Self, SigtraderError> {
        let s = s.trim();
        let invalid = || SigtraderError::ConfigInvalid {
            section: "strategy".into(),
            key: "timeframe".into(),
            reason: format!("expected <n>m, <n>h or <n>d, got '{}'", s),
        };
        let Some((unit_start, _)) = s.char_indices().last() else {
            return Err(invalid());
        };
        let (digits, unit) = s.split_at(unit_start);
        let n: u32 = digits.parse().map_err(|_| invalid())?;
        let factor = match unit {
            "m" => 1,
            "h" => 60,
            "d" => 1440,
            _ => return Err(invalid()),
        };
        if n == 0 {
            return Err(invalid());
        }
        Ok(Self {
            minutes: n.checked_mul(factor).ok_or_else(invalid)?,
        })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minutes % 1440 == 0 {
            write!(f, "{}d", self.minutes / 1440)
        } else if self.minutes % 60 == 0 {
            write!(f, "{}h", self.minutes / 60)
        } else {
            write!(f, "{}m", self.minutes)
        }
    }
}

/// Which flags are suppressed while the series is shorter than the startup
/// candle count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupGate {
    Off,
    #[default]
    Entry,
    Both,
}

impl StartupGate {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(StartupGate::Off),
            "entry" => Some(StartupGate::Entry),
            "both" => Some(StartupGate::Both),
            _ => None,
        }
    }

    pub fn gates_entry(self) -> bool {
        matches!(self, StartupGate::Entry | StartupGate::Both)
    }

    pub fn gates_exit(self) -> bool {
        self == StartupGate::Both
    }
}

impl fmt::Display for StartupGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StartupGate::Off => "off",
            StartupGate::Entry => "entry",
            StartupGate::Both => "both",
        };
        write!(f, "{}", s)
    }
}

/// Per-instrument close-price ring buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferConfig {
    pub size: usize,
    pub column: String,
}

impl BufferConfig {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            column: BUFFER_MOMENTUM_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub name: String,
    pub description: String,
    pub timeframe: Timeframe,
    pub startup_candles: usize,
    pub startup_gate: StartupGate,
    pub max_open_trades: usize,
    pub features: Vec<FeatureSpec>,
    pub entry: Option<Rule>,
    pub exit: Option<Rule>,
    pub risk: RiskProfile,
    pub stoploss: StopLossPolicy,
    pub roi: RoiLadder,
    pub trailing: Option<TrailingStop>,
    pub exit_thresholds: ExitThresholds,
    pub buffer: Option<BufferConfig>,
    pub classifier: Option<ClassifierConfig>,
}

impl StrategyConfig {
    /// Checks that do not need the feature pipeline.
    pub fn validate(&self) -> Result<(), SigtraderError> {
        if self.name.trim().is_empty() {
            return Err(SigtraderError::ConfigMissing {
                section: "strategy".into(),
                key: "name".into(),
            });
        }
        if self.max_open_trades == 0 {
            return Err(SigtraderError::ConfigInvalid {
                section: "strategy".into(),
                key: "max_open_trades".into(),
                reason: "max_open_trades must be at least 1".into(),
            });
        }
        if self.entry.is_none() && self.classifier.is_none() {
            return Err(SigtraderError::ConfigMissing {
                section: "strategy".into(),
                key: "entry".into(),
            });
        }
        if let Some(trailing) = &self.trailing {
            trailing.validate()?;
        }
        if let Some(buffer) = &self.buffer {
            if buffer.size < 2 {
                return Err(SigtraderError::ConfigInvalid {
                    section: "buffer".into(),
                    key: "size".into(),
                    reason: "buffer size must be at least 2".into(),
                });
            }
        }
        if let Some(classifier) = &self.classifier {
            classifier.validate()?;
        }
        Ok(())
    }
}
