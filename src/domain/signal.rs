//! Entry/exit flags aligned with a feature table.

use crate::domain::feature_table::FeatureTable;
use crate::domain::rule::Rule;
use crate::domain::rule_eval::evaluate_series;

#[derive(Debug, Clone, PartialEq)]
pub struct SignalFrame {
    pub table: FeatureTable,
    pub enter_long: Vec<bool>,
    pub exit: Vec<bool>,
}

impl SignalFrame {
    /// Evaluate both rule trees independently over every row. An absent
    /// rule never fires.
    pub fn evaluate(table: FeatureTable, entry: Option<&Rule>, exit: Option<&Rule>) -> Self {
        let flags = |rule: Option<&Rule>| match rule {
            Some(rule) => evaluate_series(rule, &table),
            None => vec![false; table.len()],
        };
        let enter_long = flags(entry);
        let exit = flags(exit);
        Self {
            table,
            enter_long,
            exit,
        }
    }

    /// A frame with every flag false.
    pub fn quiet(table: FeatureTable) -> Self {
        let n = table.len();
        Self {
            table,
            enter_long: vec![false; n],
            exit: vec![false; n],
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Row indices where `enter_long` is set.
    pub fn entry_rows(&self) -> Vec<usize> {
        flagged(&self.enter_long)
    }

    pub fn exit_rows(&self) -> Vec<usize> {
        flagged(&self.exit)
    }

    pub fn last_entry(&self) -> bool {
        self.enter_long.last().copied().unwrap_or(false)
    }

    pub fn last_exit(&self) -> bool {
        self.exit.last().copied().unwrap_or(false)
    }
}

fn flagged(flags: &[bool]) -> Vec<usize> {
    flags
        .iter()
        .enumerate()
        .filter_map(|(i, &f)| f.then_some(i))
        .collect()
}
