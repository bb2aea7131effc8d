//! Immutable table of aligned feature columns.

use crate::domain::error::SigtraderError;
use crate::domain::ohlcv::{PriceField, Series};
use std::collections::BTreeMap;

/// One row per candle; each column maps a name to per-row values where
/// `None` marks an undefined value.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    len: usize,
    columns: BTreeMap<String, Vec<Option<f64>>>,
    insufficient: bool,
}

impl FeatureTable {
    /// A table holding only the passthrough columns of `series`.
    pub fn from_series(series: &Series) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(
            "timestamp".to_string(),
            series
                .candles()
                .iter()
                .map(|c| Some(c.timestamp.and_utc().timestamp() as f64))
                .collect(),
        );
        for field in PriceField::ALL {
            columns.insert(
                field.name().to_string(),
                series.field(field).into_iter().map(Some).collect(),
            );
        }
        Self {
            len: series.len(),
            columns,
            insufficient: false,
        }
    }

    /// A new table with one more column.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, SigtraderError> {
        let name = name.into();
        if values.len() != self.len {
            return Err(SigtraderError::ColumnLength {
                name,
                expected: self.len,
                actual: values.len(),
            });
        }
        if self.columns.contains_key(&name) {
            return Err(SigtraderError::FeatureInvalid {
                name,
                reason: "column already exists".into(),
            });
        }
        self.columns.insert(name, values);
        Ok(self)
    }

    /// Insert without the duplicate and length checks; the pipeline has
    /// already validated both.
    pub(crate) fn insert_column(&mut self, name: String, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.len);
        self.columns.insert(name, values);
    }

    pub(crate) fn into_insufficient(mut self) -> Self {
        self.insufficient = true;
        self
    }

    /// True when the series was shorter than the pipeline warm-up; every
    /// feature column is then undefined.
    pub fn is_insufficient(&self) -> bool {
        self.insufficient
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// The value at `row`; `None` for unknown columns, out-of-range rows and
    /// undefined or non-finite cells.
    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        self.columns
            .get(name)?
            .get(row)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
    }

    /// The first `len` rows (all rows when `len` exceeds the table).
    pub fn head(&self, len: usize) -> FeatureTable {
        let len = len.min(self.len);
        FeatureTable {
            len,
            columns: self
                .columns
                .iter()
                .map(|(name, col)| (name.clone(), col[..len].to_vec()))
                .collect(),
            insufficient: self.insufficient,
        }
    }

    pub fn row(&self, index: usize) -> FeatureRow {
        FeatureRow {
            values: self
                .columns
                .iter()
                .map(|(name, col)| (name.clone(), col.get(index).copied().flatten()))
                .collect(),
        }
    }

    pub fn last_row(&self) -> Option<FeatureRow> {
        self.len.checked_sub(1).map(|i| self.row(i))
    }
}

/// A single row detached from its table, as seen by the risk resolver and
/// the classifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    values: BTreeMap<String, Option<f64>>,
}

impl FeatureRow {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), Some(v))).collect(),
        }
    }

    /// Defined, finite value of `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .get(name)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
    }

    /// The stored cell, finite or not. Outer `None` means the column is absent.
    pub fn raw(&self, name: &str) -> Option<Option<f64>> {
        self.values.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.values.insert(name.into(), value);
    }
}
