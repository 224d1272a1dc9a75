use thiserror::Error;

/// Common error type for SQLSight components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metric {metric} expects {expected} label values, got {actual}")]
    LabelCardinality {
        metric: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias using SQLSight's Error.
pub type Result<T> = std::result::Result<T, Error>;
