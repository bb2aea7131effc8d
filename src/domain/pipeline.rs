//! Feature pipeline: turns a candle series into a feature table.
//!
//! The pipeline is planned once when it is built: names are checked for
//! duplicates and passthrough shadowing, references are resolved, cycles are
//! rejected and an evaluation order is fixed (declaration order wherever the
//! dependencies allow). Each `run` starts from a clean indicator cache, so the
//! same series always produces the same table.

use crate::domain::error::SigtraderError;
use crate::domain::feature::{FeatureKind, FeatureSpec, PASSTHROUGH_COLUMNS, Source};
use crate::domain::feature_table::FeatureTable;
use crate::domain::indicator::{IndicatorOutput, IndicatorType, calculate_sma};
use crate::domain::indicator_helpers::{on_defined_tail, safe_div};
use crate::domain::ohlcv::Series;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    specs: Vec<FeatureSpec>,
    order: Vec<usize>,
    warmups: HashMap<String, usize>,
    warmup: usize,
}

type IndicatorCache = HashMap<(IndicatorType, Option<Source>), IndicatorOutput>;

impl FeaturePipeline {
    pub fn new(specs: Vec<FeatureSpec>) -> Result<Self, SigtraderError> {
        let mut names = HashSet::new();
        for spec in &specs {
            if PASSTHROUGH_COLUMNS.contains(&spec.name.as_str()) {
                return Err(invalid(&spec.name, "name shadows a candle column"));
            }
            if spec.name.is_empty() {
                return Err(invalid(&spec.name, "name is empty"));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(invalid(&spec.name, "declared more than once"));
            }
            spec.kind.validate().map_err(|reason| invalid(&spec.name, &reason))?;
        }
        for spec in &specs {
            for input in spec.kind.inputs() {
                if let Some(dep) = input.feature_name() {
                    if !names.contains(dep) {
                        return Err(invalid(&spec.name, &format!("unknown column '{}'", dep)));
                    }
                }
            }
        }

        let order = plan_order(&specs)?;

        let mut warmups: HashMap<String, usize> = HashMap::new();
        for &i in &order {
            let spec = &specs[i];
            let inherited = spec
                .kind
                .inputs()
                .into_iter()
                .filter_map(|s| s.feature_name().and_then(|n| warmups.get(n)).copied())
                .max()
                .unwrap_or(0);
            warmups.insert(spec.name.clone(), inherited + spec.kind.own_warmup());
        }
        let warmup = warmups.values().copied().max().unwrap_or(0);

        debug!(
            order = ?order.iter().map(|&i| specs[i].name.as_str()).collect::<Vec<_>>(),
            warmup,
            "planned feature pipeline"
        );

        Ok(Self {
            specs,
            order,
            warmups,
            warmup,
        })
    }

    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.warmups.contains_key(name)
    }

    /// Leading undefined rows of the slowest feature on fully defined input.
    pub fn warmup(&self) -> usize {
        self.warmup
    }

    /// Shortest series on which every feature has at least one defined row.
    pub fn min_rows(&self) -> usize {
        if self.warmup == 0 { 0 } else { self.warmup + 1 }
    }

    pub fn feature_warmup(&self, name: &str) -> Option<usize> {
        self.warmups.get(name).copied()
    }

    pub fn run(&self, series: &Series) -> FeatureTable {
        let mut table = FeatureTable::from_series(series);
        let n = series.len();

        if n < self.min_rows() {
            debug!(rows = n, needed = self.min_rows(), "series shorter than warm-up");
            let mut table = table.into_insufficient();
            for spec in &self.specs {
                table.insert_column(spec.name.clone(), vec![None; n]);
            }
            return table;
        }

        let mut columns: HashMap<&str, Vec<Option<f64>>> = HashMap::new();
        let mut cache = IndicatorCache::new();
        for &i in &self.order {
            let spec = &self.specs[i];
            let values = compute(&spec.kind, series, &columns, &mut cache);
            columns.insert(spec.name.as_str(), values);
        }

        for spec in &self.specs {
            let values = columns.remove(spec.name.as_str()).unwrap_or_else(|| vec![None; n]);
            table.insert_column(spec.name.clone(), values);
        }
        table
    }
}

fn invalid(name: &str, reason: &str) -> SigtraderError {
    SigtraderError::FeatureInvalid {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Dependency order that keeps declaration order wherever possible.
fn plan_order(specs: &[FeatureSpec]) -> Result<Vec<usize>, SigtraderError> {
    let mut done: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(specs.len());
    let mut pending: Vec<usize> = (0..specs.len()).collect();

    while !pending.is_empty() {
        let ready = pending.iter().position(|&i| {
            specs[i]
                .kind
                .inputs()
                .into_iter()
                .filter_map(Source::feature_name)
                .all(|dep| done.contains(dep))
        });
        match ready {
            Some(pos) => {
                let i = pending.remove(pos);
                done.insert(specs[i].name.as_str());
                order.push(i);
            }
            None => {
                let stuck: Vec<&str> = pending.iter().map(|&i| specs[i].name.as_str()).collect();
                return Err(invalid(
                    stuck[0],
                    &format!("reference cycle among {}", stuck.join(", ")),
                ));
            }
        }
    }
    Ok(order)
}

fn read(
    source: &Source,
    series: &Series,
    columns: &HashMap<&str, Vec<Option<f64>>>,
) -> Vec<Option<f64>> {
    match source {
        Source::Price(field) => series.field(*field).into_iter().map(Some).collect(),
        Source::Feature(name) => columns
            .get(name.as_str())
            .cloned()
            .unwrap_or_else(|| vec![None; series.len()]),
    }
}

fn zip2(
    a: &[Option<f64>],
    b: &[Option<f64>],
    f: impl Fn(f64, f64) -> Option<f64>,
) -> Vec<Option<f64>> {
    a.iter().zip(b).map(|(x, y)| f((*x)?, (*y)?)).collect()
}

fn compute(
    kind: &FeatureKind,
    series: &Series,
    columns: &HashMap<&str, Vec<Option<f64>>>,
    cache: &mut IndicatorCache,
) -> Vec<Option<f64>> {
    let n = series.len();
    match kind {
        FeatureKind::Indicator {
            indicator,
            field,
            source,
        } => {
            let key = (*indicator, source.clone());
            let output = cache.entry(key).or_insert_with(|| {
                let input = match source {
                    Some(s) => read(s, series, columns),
                    None => Vec::new(),
                };
                indicator.compute(series, &input)
            });
            output
                .select(*field)
                .map(<[Option<f64>]>::to_vec)
                .unwrap_or_else(|| vec![None; n])
        }
        FeatureKind::Ratio {
            numerator,
            denominator,
        } => zip2(
            &read(numerator, series, columns),
            &read(denominator, series, columns),
            safe_div,
        ),
        FeatureKind::Spread {
            left,
            right,
            scale,
            absolute,
        } => {
            let diff = zip2(
                &read(left, series, columns),
                &read(right, series, columns),
                |a, b| Some(a - b),
            );
            let scaled = match scale {
                Some(s) => zip2(&diff, &read(s, series, columns), safe_div),
                None => diff,
            };
            if *absolute {
                scaled.into_iter().map(|v| v.map(f64::abs)).collect()
            } else {
                scaled
            }
        }
        FeatureKind::Change { source, lag } => {
            let x = read(source, series, columns);
            (0..n)
                .map(|i| {
                    if i < *lag {
                        None
                    } else {
                        Some(x[i]? - x[i - lag]?)
                    }
                })
                .collect()
        }
        FeatureKind::Lag { source, lag } => {
            let x = read(source, series, columns);
            (0..n).map(|i| if i < *lag { None } else { x[i - lag] }).collect()
        }
        FeatureKind::Position {
            value,
            lower,
            upper,
        } => {
            let v = read(value, series, columns);
            let lo = read(lower, series, columns);
            let hi = read(upper, series, columns);
            (0..n)
                .map(|i| safe_div(v[i]? - lo[i]?, hi[i]? - lo[i]?))
                .collect()
        }
        FeatureKind::Regime {
            trend_strength,
            volatility,
            trend_threshold,
            window,
            volatility_factor,
        } => {
            let trend = read(trend_strength, series, columns);
            let vol = read(volatility, series, columns);
            let baseline = on_defined_tail(&vol, |xs| calculate_sma(xs, *window));
            (0..n)
                .map(|i| {
                    let t = trend[i]?;
                    if t > *trend_threshold {
                        return Some(2.0);
                    }
                    let (v, b) = (vol[i]?, baseline[i]?);
                    Some(if v > b * volatility_factor { 1.0 } else { 0.0 })
                })
                .collect()
        }
    }
}
