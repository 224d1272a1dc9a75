//! Error types for the exporter.

use std::time::Duration;

use thiserror::Error;

/// Errors a single scraper can report.
///
/// A scrape error is local to its task: it is logged and counted, and never
/// stops sibling tasks.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The database rejected or failed the query.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The task did not finish before its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The result set did not have the expected shape.
    #[error("unexpected result: {0}")]
    Decode(String),

    /// A sample could not be built.
    #[error("metric error: {0}")]
    Metric(#[from] sqlsight_common::Error),

    /// The scraper panicked.
    #[error("scraper panicked: {0}")]
    Panic(String),

    /// Any other failure reported by a scraper or query target.
    #[error("{0}")]
    Other(String),
}

impl ScrapeError {
    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Cycle-level and construction errors.
///
/// `Clone` so that every caller waiting on one failed bootstrap attempt can
/// observe the same error.
#[derive(Debug, Clone, Error)]
pub enum ExporterError {
    /// The connection pool could not be created.
    #[error("Error opening connection to database: {0}")]
    Bootstrap(String),

    /// The liveness probe failed.
    #[error("Error pinging mysqld: {0}")]
    Liveness(String),

    /// Invalid task registry or exporter options.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExporterError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
