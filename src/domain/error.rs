//! Domain error types.

/// A parse error with position information for rule and feature parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for sigtrader.
///
/// Data-quality problems inside a valid series never surface here: they degrade
/// to undefined feature values and absent signals. These variants cover
/// configuration mistakes, malformed inputs at the boundary, and classifier
/// training that had nothing to learn from.
#[derive(Debug, thiserror::Error)]
pub enum SigtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("invalid rule: {reason}")]
    RuleInvalid { reason: String },

    #[error("invalid feature '{name}': {reason}")]
    FeatureInvalid { name: String, reason: String },

    #[error("column '{name}' has {actual} rows, table has {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid series: {reason}")]
    InvalidSeries { reason: String },

    #[error("unknown strategy preset '{name}'")]
    UnknownPreset { name: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("insufficient data for {instrument}: have {rows} usable rows, need {minimum}")]
    InsufficientData {
        instrument: String,
        rows: usize,
        minimum: usize,
    },

    #[error("classifier training failed: {reason}")]
    Training { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SigtraderError> for std::process::ExitCode {
    fn from(err: &SigtraderError) -> Self {
        let code: u8 = match err {
            SigtraderError::Io(_) => 1,
            SigtraderError::ConfigParse { .. }
            | SigtraderError::ConfigMissing { .. }
            | SigtraderError::ConfigInvalid { .. } => 2,
            SigtraderError::RuleParse(_)
            | SigtraderError::RuleInvalid { .. }
            | SigtraderError::FeatureInvalid { .. }
            | SigtraderError::ColumnLength { .. } => 4,
            SigtraderError::Data { .. }
            | SigtraderError::InsufficientData { .. }
            | SigtraderError::Training { .. } => 5,
            SigtraderError::InvalidSeries { .. } => 6,
            SigtraderError::UnknownPreset { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}
