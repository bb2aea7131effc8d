//! Trainable probabilistic classifier behind the boolean signal contract.
//!
//! Rows are labelled by their forward return, features are standardised and a
//! bag of smartcore decision trees produces class probabilities. Prediction
//! never fails: every degraded outcome maps to the neutral `(0.5, Flat)`.

use crate::domain::error::SigtraderError;
use crate::domain::feature_table::{FeatureRow, FeatureTable};
use crate::domain::indicator_helpers::{mean, population_variance};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smartcore::error::Failed;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters,
};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

pub const DEFAULT_LOOKAHEAD: usize = 3;
pub const DEFAULT_THRESHOLD_RETURN: f64 = 0.003;
pub const DEFAULT_CONFIDENCE: f64 = 0.55;
pub const DEFAULT_HOLDOUT: usize = 10;
pub const DEFAULT_MIN_ROWS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Down,
    Flat,
    Up,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Down, Direction::Flat, Direction::Up];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Down => "down",
            Direction::Flat => "flat",
            Direction::Up => "up",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub confidence: f64,
    pub signal: Direction,
}

impl Prediction {
    pub const NEUTRAL: Prediction = Prediction {
        confidence: 0.5,
        signal: Direction::Flat,
    };

    /// Entry when confident and pointing up.
    pub fn is_entry(&self, threshold: f64) -> bool {
        self.confidence > threshold && self.signal == Direction::Up
    }

    pub fn is_exit(&self, threshold: f64) -> bool {
        self.confidence > threshold && self.signal == Direction::Down
    }
}

/// Why a prediction fell back to neutral.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Degraded {
    #[error("no trained model")]
    ModelUnavailable,
    #[error("feature '{0}' is missing or undefined")]
    MissingFeature(String),
    #[error("feature '{0}' is not finite")]
    NonFinite(String),
    #[error("model was trained without every class")]
    IncompleteClasses,
    #[error("model failed: {0}")]
    ModelFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub features: Vec<String>,
    pub lookahead: usize,
    pub threshold_return: f64,
    pub confidence: f64,
    pub holdout: usize,
    pub min_rows: usize,
}

impl ClassifierConfig {
    pub fn new(features: Vec<String>) -> Self {
        Self {
            features,
            lookahead: DEFAULT_LOOKAHEAD,
            threshold_return: DEFAULT_THRESHOLD_RETURN,
            confidence: DEFAULT_CONFIDENCE,
            holdout: DEFAULT_HOLDOUT,
            min_rows: DEFAULT_MIN_ROWS,
        }
    }

    pub fn validate(&self) -> Result<(), SigtraderError> {
        let invalid = |key: &str, reason: String| SigtraderError::ConfigInvalid {
            section: "classifier".into(),
            key: key.into(),
            reason,
        };
        if self.features.is_empty() {
            return Err(invalid("features", "at least one feature is required".into()));
        }
        if self.lookahead == 0 {
            return Err(invalid("lookahead", "must be at least 1".into()));
        }
        if !self.threshold_return.is_finite() || self.threshold_return < 0.0 {
            return Err(invalid(
                "threshold",
                format!("must be a non-negative number, got {}", self.threshold_return),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(invalid(
                "confidence",
                format!("must be within [0, 1], got {}", self.confidence),
            ));
        }
        if self.min_rows == 0 {
            return Err(invalid("min_rows", "must be at least 1".into()));
        }
        Ok(())
    }
}

/// Up/down/flat by the return over `lookahead` rows. The last `lookahead`
/// rows and rows with undefined prices have no label.
pub fn label_rows(close: &[Option<f64>], lookahead: usize, threshold: f64) -> Vec<Option<Direction>> {
    (0..close.len())
        .map(|i| {
            let now = close[i]?;
            let later = (*close.get(i + lookahead)?)?;
            let ret = (later - now) / now;
            if !ret.is_finite() {
                None
            } else if ret > threshold {
                Some(Direction::Up)
            } else if ret < -threshold {
                Some(Direction::Down)
            } else {
                Some(Direction::Flat)
            }
        })
        .collect()
}

/// Per-feature standardisation; a zero spread scales by 1.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);
        for j in 0..width {
            let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            let m = mean(&column);
            let std = population_variance(&column).sqrt();
            means.push(m);
            scales.push(if std > 0.0 && std.is_finite() { std } else { 1.0 });
        }
        Self { means, scales }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

/// A model that turns a feature vector into class probabilities.
pub trait ProbabilisticClassifier: Sized {
    fn fit(rows: &[Vec<f64>], labels: &[Direction]) -> Result<Self, SigtraderError>;

    /// Probabilities for the classes seen in training.
    fn predict_proba(&self, row: &[f64]) -> Result<BTreeMap<Direction, f64>, Degraded>;
}

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

fn class_code(direction: Direction) -> i32 {
    match direction {
        Direction::Down => -1,
        Direction::Flat => 0,
        Direction::Up => 1,
    }
}

/// Sorted, deduplicated; matches the column order of a tree's probabilities.
fn distinct(labels: &[Direction]) -> Vec<Direction> {
    let mut classes = labels.to_vec();
    classes.sort();
    classes.dedup();
    classes
}

fn training_failed(err: Failed) -> SigtraderError {
    SigtraderError::Training {
        reason: err.to_string(),
    }
}

/// One bagged learner. A bootstrap sample holding a single class cannot grow
/// a tree, so it votes for that class.
#[derive(Debug, PartialEq)]
enum Voter {
    Tree { tree: Tree, classes: Vec<Direction> },
    Constant(Direction),
}

impl Voter {
    fn vote(&self, x: &DenseMatrix<f64>) -> Result<Vec<(Direction, f64)>, Failed> {
        use smartcore::linalg::basic::arrays::Array;

        match self {
            Voter::Constant(class) => Ok(vec![(*class, 1.0)]),
            Voter::Tree { tree, classes } => {
                let proba = tree.predict_proba(x)?;
                Ok(classes
                    .iter()
                    .enumerate()
                    .map(|(j, class)| (*class, *proba.get((0, j))))
                    .collect())
            }
        }
    }
}

/// Bagged smartcore decision trees on seeded bootstrap samples. Class
/// probabilities are the mean of the trees' leaf probabilities.
#[derive(Debug, PartialEq)]
pub struct TreeEnsemble {
    voters: Vec<Voter>,
    classes: Vec<Direction>,
}

impl TreeEnsemble {
    pub const TREES: usize = 100;
    pub const MAX_DEPTH: u16 = 10;
    pub const MIN_SAMPLES_SPLIT: usize = 20;
    pub const MIN_SAMPLES_LEAF: usize = 10;
    pub const SEED: u64 = 42;

    fn tree_parameters(seed: u64) -> DecisionTreeClassifierParameters {
        DecisionTreeClassifierParameters {
            seed: Some(seed),
            ..DecisionTreeClassifierParameters::default()
                .with_max_depth(Self::MAX_DEPTH)
                .with_min_samples_split(Self::MIN_SAMPLES_SPLIT)
                .with_min_samples_leaf(Self::MIN_SAMPLES_LEAF)
        }
    }

    fn grow(rows: &Vec<Vec<f64>>, labels: &[Direction], seed: u64) -> Result<Voter, SigtraderError> {
        let classes = distinct(labels);
        if classes.len() == 1 {
            return Ok(Voter::Constant(classes[0]));
        }
        let x = DenseMatrix::from_2d_vec(rows).map_err(training_failed)?;
        let y: Vec<i32> = labels.iter().map(|&l| class_code(l)).collect();
        let tree = Tree::fit(&x, &y, Self::tree_parameters(seed)).map_err(training_failed)?;
        Ok(Voter::Tree { tree, classes })
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }
}

impl ProbabilisticClassifier for TreeEnsemble {
    fn fit(rows: &[Vec<f64>], labels: &[Direction]) -> Result<Self, SigtraderError> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(SigtraderError::Training {
                reason: format!(
                    "needs matching rows and labels, got {} and {}",
                    rows.len(),
                    labels.len()
                ),
            });
        }

        let n = rows.len();
        let mut rng = StdRng::seed_from_u64(Self::SEED);
        let voters = (0..Self::TREES)
            .map(|t| {
                let picks: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let sample: Vec<Vec<f64>> = picks.iter().map(|&i| rows[i].clone()).collect();
                let sample_labels: Vec<Direction> = picks.iter().map(|&i| labels[i]).collect();
                Self::grow(&sample, &sample_labels, Self::SEED + t as u64)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            voters,
            classes: distinct(labels),
        })
    }

    fn predict_proba(&self, row: &[f64]) -> Result<BTreeMap<Direction, f64>, Degraded> {
        let failed = |err: Failed| Degraded::ModelFailed(err.to_string());
        let x = DenseMatrix::from_2d_vec(&vec![row.to_vec()]).map_err(failed)?;
        let weight = 1.0 / self.voters.len() as f64;

        let mut proba: BTreeMap<Direction, f64> =
            self.classes.iter().map(|&class| (class, 0.0)).collect();
        for voter in &self.voters {
            for (class, p) in voter.vote(&x).map_err(failed)? {
                *proba.entry(class).or_insert(0.0) += p * weight;
            }
        }
        Ok(proba)
    }
}

/// Scaler, trained parameters and the ordered feature names they expect.
#[derive(Debug, PartialEq)]
pub struct ClassifierModel<C = TreeEnsemble> {
    scaler: StandardScaler,
    model: C,
    feature_names: Vec<String>,
}

impl<C: ProbabilisticClassifier> ClassifierModel<C> {
    /// Train on every row whose features and label are defined and finite.
    pub fn train(
        instrument: &str,
        table: &FeatureTable,
        config: &ClassifierConfig,
    ) -> Result<Self, SigtraderError> {
        for name in &config.features {
            if !table.has_column(name) {
                return Err(SigtraderError::FeatureInvalid {
                    name: name.clone(),
                    reason: "classifier feature is not in the feature table".into(),
                });
            }
        }
        let close = table.column("close").ok_or_else(|| SigtraderError::Data {
            reason: "feature table has no close column".into(),
        })?;
        let labels = label_rows(close, config.lookahead, config.threshold_return);

        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            let Some(label) = label else { continue };
            let features: Option<Vec<f64>> = config
                .features
                .iter()
                .map(|name| table.value(name, i))
                .collect();
            if let Some(features) = features {
                rows.push(features);
                targets.push(*label);
            }
        }

        if rows.len() < config.min_rows {
            return Err(SigtraderError::InsufficientData {
                instrument: instrument.to_string(),
                rows: rows.len(),
                minimum: config.min_rows,
            });
        }

        let scaler = StandardScaler::fit(&rows);
        let scaled: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform(r)).collect();
        let model = C::fit(&scaled, &targets)?;

        info!(
            instrument,
            rows = rows.len(),
            features = config.features.len(),
            "trained classifier"
        );
        Ok(Self {
            scaler,
            model,
            feature_names: config.features.clone(),
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn try_predict(&self, row: &FeatureRow) -> Result<Prediction, Degraded> {
        let mut values = Vec::with_capacity(self.feature_names.len());
        for name in &self.feature_names {
            match row.raw(name) {
                None | Some(None) => return Err(Degraded::MissingFeature(name.clone())),
                Some(Some(v)) if !v.is_finite() => return Err(Degraded::NonFinite(name.clone())),
                Some(Some(v)) => values.push(v),
            }
        }

        let proba = self.model.predict_proba(&self.scaler.transform(&values))?;
        let (Some(up), Some(down), Some(_)) = (
            proba.get(&Direction::Up),
            proba.get(&Direction::Down),
            proba.get(&Direction::Flat),
        ) else {
            return Err(Degraded::IncompleteClasses);
        };
        if !up.is_finite() || !down.is_finite() {
            return Err(Degraded::NonFinite("probability".into()));
        }

        let signal = if up > down {
            Direction::Up
        } else if up < down {
            Direction::Down
        } else {
            Direction::Flat
        };
        Ok(Prediction {
            confidence: (up - down).abs(),
            signal,
        })
    }

    pub fn predict(&self, row: &FeatureRow) -> Prediction {
        self.try_predict(row).unwrap_or_else(|reason| {
            debug!(%reason, "degraded prediction");
            Prediction::NEUTRAL
        })
    }
}

/// Neutral prediction when no model is available.
pub fn predict_with<C: ProbabilisticClassifier>(
    model: Option<&ClassifierModel<C>>,
    row: &FeatureRow,
) -> Prediction {
    match model {
        Some(m) => m.predict(row),
        None => {
            debug!(reason = %Degraded::ModelUnavailable, "degraded prediction");
            Prediction::NEUTRAL
        }
    }
}
