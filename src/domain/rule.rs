//! Rule AST data structures.
//!
//! This module defines the abstract syntax tree for signal rules:
//! - `Operand`: What can be compared (constants, feature table columns)
//! - `Rule`: The rule AST with comparison, regime, composite, and temporal variants

use crate::domain::feature::Regime;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Constant(f64),
    /// A feature table column read `lag` rows back (`bb_upper[1]`).
    Column { name: String, lag: usize },
}

impl Operand {
    pub fn column(name: impl Into<String>) -> Self {
        Operand::Column {
            name: name.into(),
            lag: 0,
        }
    }

    pub fn lagged(name: impl Into<String>, lag: usize) -> Self {
        Operand::Column {
            name: name.into(),
            lag,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    CrossAbove {
        left: Operand,
        right: Operand,
    },
    CrossBelow {
        left: Operand,
        right: Operand,
    },
    Above {
        left: Operand,
        right: Operand,
    },
    Below {
        left: Operand,
        right: Operand,
    },
    AtLeast {
        left: Operand,
        right: Operand,
    },
    AtMost {
        left: Operand,
        right: Operand,
    },
    Equals {
        left: Operand,
        right: Operand,
    },
    Between {
        operand: Operand,
        lower: f64,
        upper: f64,
    },
    /// True when the regime-coded `column` holds one of `regimes`.
    InRegime {
        column: String,
        regimes: Vec<Regime>,
    },
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Not(Box<Rule>),
    Consecutive {
        rule: Box<Rule>,
        count: usize,
    },
    AnyOf {
        rule: Box<Rule>,
        count: usize,
    },
}

impl Rule {
    /// Every column name the rule reads.
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Rule::CrossAbove { left, right }
            | Rule::CrossBelow { left, right }
            | Rule::Above { left, right }
            | Rule::Below { left, right }
            | Rule::AtLeast { left, right }
            | Rule::AtMost { left, right }
            | Rule::Equals { left, right } => {
                operand_column(left, out);
                operand_column(right, out);
            }
            Rule::Between { operand, .. } => operand_column(operand, out),
            Rule::InRegime { column, .. } => {
                out.insert(column.as_str());
            }
            Rule::And(rules) | Rule::Or(rules) => {
                for r in rules {
                    r.collect_columns(out);
                }
            }
            Rule::Not(rule) | Rule::Consecutive { rule, .. } | Rule::AnyOf { rule, .. } => {
                rule.collect_columns(out)
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Constant(v) => write!(f, "{}", v),
            Operand::Column { name, lag: 0 } => write!(f, "{}", name),
            Operand::Column { name, lag } => write!(f, "{}[{}]", name, lag),
        }
    }
}

/// Renders the rule back in the text DSL.
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, keyword: &str, rules: &[Rule]| {
            write!(f, "{}(", keyword)?;
            for (i, r) in rules.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", r)?;
            }
            write!(f, ")")
        };
        match self {
            Rule::CrossAbove { left, right } => write!(f, "CROSS_ABOVE({}, {})", left, right),
            Rule::CrossBelow { left, right } => write!(f, "CROSS_BELOW({}, {})", left, right),
            Rule::Above { left, right } => write!(f, "ABOVE({}, {})", left, right),
            Rule::Below { left, right } => write!(f, "BELOW({}, {})", left, right),
            Rule::AtLeast { left, right } => write!(f, "AT_LEAST({}, {})", left, right),
            Rule::AtMost { left, right } => write!(f, "AT_MOST({}, {})", left, right),
            Rule::Equals { left, right } => write!(f, "EQUALS({}, {})", left, right),
            Rule::Between {
                operand,
                lower,
                upper,
            } => write!(f, "BETWEEN({}, {}, {})", operand, lower, upper),
            Rule::InRegime { column, regimes } => {
                write!(f, "REGIME({}", column)?;
                for r in regimes {
                    write!(f, ", {}", r)?;
                }
                write!(f, ")")
            }
            Rule::And(rules) => list(f, "AND", rules),
            Rule::Or(rules) => list(f, "OR", rules),
            Rule::Not(rule) => write!(f, "NOT({})", rule),
            Rule::Consecutive { rule, count } => write!(f, "CONSECUTIVE({}, {})", rule, count),
            Rule::AnyOf { rule, count } => write!(f, "ANY_OF({}, {})", rule, count),
        }
    }
}

fn operand_column<'a>(operand: &'a Operand, out: &mut BTreeSet<&'a str>) {
    if let Operand::Column { name, .. } = operand {
        out.insert(name.as_str());
    }
}
