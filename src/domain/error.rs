//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for alphatrader.
#[derive(Debug, thiserror::Error)]
pub enum AlphaTraderError {
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

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no universe data for {date}")]
    NoData { date: NaiveDate },

    #[error("shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate constraint name: {name}")]
    DuplicateConstraint { name: String },

    #[error("signal source {source_name} needs factor {factor} which the universe does not carry")]
    MissingFactor { source_name: String, factor: String },

    #[error("signal source {source_name} has no model valid on {date}")]
    NoModel { source_name: String, date: NaiveDate },

    #[error("portfolio optimization failed on {date}: {reason}")]
    InfeasibleOptimization { date: NaiveDate, reason: String },

    #[error("missing {field} for traded asset {code} on {date}")]
    MissingJoinData {
        date: NaiveDate,
        code: String,
        field: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&AlphaTraderError> for std::process::ExitCode {
    fn from(err: &AlphaTraderError) -> Self {
        let code: u8 = match err {
            AlphaTraderError::Io(_) => 1,
            AlphaTraderError::ConfigParse { .. }
            | AlphaTraderError::ConfigMissing { .. }
            | AlphaTraderError::ConfigInvalid { .. } => 2,
            AlphaTraderError::Data { .. } | AlphaTraderError::NoData { .. } => 3,
            AlphaTraderError::ShapeMismatch { .. }
            | AlphaTraderError::DuplicateConstraint { .. }
            | AlphaTraderError::MissingFactor { .. }
            | AlphaTraderError::NoModel { .. } => 4,
            AlphaTraderError::InfeasibleOptimization { .. } => 5,
            AlphaTraderError::MissingJoinData { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
