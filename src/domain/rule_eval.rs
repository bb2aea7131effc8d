//! Rule evaluation over a feature table.
//!
//! Evaluation is three-valued: `Some(true)`, `Some(false)` or `None` when an
//! input is undefined. Composites follow Kleene logic and the per-row output
//! collapses `None` to `false`.
//!
//! - `CROSS_ABOVE`/`CROSS_BELOW`: undefined at row 0 and whenever either row is undefined
//! - `AND`: false if any child is false, else undefined if any child is undefined
//! - `OR`: true if any child is true, else undefined if any child is undefined
//! - `NOT`: undefined stays undefined
//! - `CONSECUTIVE(rule, N)`: AND over the N rows ending at the current one
//! - `ANY_OF(rule, N)`: OR over the last N rows (fewer near the start)
//!
//! A window of zero rows is false for both.

use crate::domain::feature::Regime;
use crate::domain::feature_table::FeatureTable;
use crate::domain::rule::{Operand, Rule};

const EPSILON: f64 = 1e-9;

pub fn evaluate(rule: &Rule, table: &FeatureTable, row: usize) -> Option<bool> {
    match rule {
        Rule::CrossAbove { left, right } => {
            let prev = row.checked_sub(1)?;
            let (l, r) = resolve_pair(left, right, table, row)?;
            let (lp, rp) = resolve_pair(left, right, table, prev)?;
            Some(l > r && lp <= rp)
        }
        Rule::CrossBelow { left, right } => {
            let prev = row.checked_sub(1)?;
            let (l, r) = resolve_pair(left, right, table, row)?;
            let (lp, rp) = resolve_pair(left, right, table, prev)?;
            Some(l < r && lp >= rp)
        }
        Rule::Above { left, right } => resolve_pair(left, right, table, row).map(|(l, r)| l > r),
        Rule::Below { left, right } => resolve_pair(left, right, table, row).map(|(l, r)| l < r),
        Rule::AtLeast { left, right } => resolve_pair(left, right, table, row).map(|(l, r)| l >= r),
        Rule::AtMost { left, right } => resolve_pair(left, right, table, row).map(|(l, r)| l <= r),
        Rule::Equals { left, right } => {
            resolve_pair(left, right, table, row).map(|(l, r)| (l - r).abs() < EPSILON)
        }
        Rule::Between {
            operand,
            lower,
            upper,
        } => resolve_operand(operand, table, row).map(|v| v >= *lower && v <= *upper),
        Rule::InRegime { column, regimes } => {
            let regime = Regime::from_code(table.value(column, row)?)?;
            Some(regimes.contains(&regime))
        }
        Rule::And(rules) => all(rules.iter().map(|r| evaluate(r, table, row))),
        Rule::Or(rules) => any(rules.iter().map(|r| evaluate(r, table, row))),
        Rule::Not(rule) => evaluate(rule, table, row).map(|v| !v),
        Rule::Consecutive { rule, count } => {
            if *count == 0 || row + 1 < *count {
                return Some(false);
            }
            all((row + 1 - *count..=row).map(|i| evaluate(rule, table, i)))
        }
        Rule::AnyOf { rule, count } => {
            if *count == 0 {
                return Some(false);
            }
            let start = row.saturating_sub(count - 1);
            any((start..=row).map(|i| evaluate(rule, table, i)))
        }
    }
}

/// Flags for every row. An insufficient table yields all `false`.
pub fn evaluate_series(rule: &Rule, table: &FeatureTable) -> Vec<bool> {
    if table.is_insufficient() {
        return vec![false; table.len()];
    }
    (0..table.len())
        .map(|row| evaluate(rule, table, row).unwrap_or(false))
        .collect()
}

fn all(values: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut undefined = false;
    for v in values {
        match v {
            Some(false) => return Some(false),
            None => undefined = true,
            Some(true) => {}
        }
    }
    if undefined { None } else { Some(true) }
}

fn any(values: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut undefined = false;
    for v in values {
        match v {
            Some(true) => return Some(true),
            None => undefined = true,
            Some(false) => {}
        }
    }
    if undefined { None } else { Some(false) }
}

fn resolve_pair(
    left: &Operand,
    right: &Operand,
    table: &FeatureTable,
    row: usize,
) -> Option<(f64, f64)> {
    Some((
        resolve_operand(left, table, row)?,
        resolve_operand(right, table, row)?,
    ))
}

fn resolve_operand(operand: &Operand, table: &FeatureTable, row: usize) -> Option<f64> {
    match operand {
        Operand::Constant(v) => Some(*v),
        Operand::Column { name, lag } => table.value(name, row.checked_sub(*lag)?),
    }
}
