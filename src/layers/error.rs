use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Rejected input: papers missing required attributes or malformed queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("paper title must not be empty")]
    EmptyTitle,

    #[error("paper '{0}' must list at least one author")]
    NoAuthors(String),

    #[error("search terms must not be empty")]
    EmptyTerms,

    #[error("max_results must be greater than zero")]
    ZeroMaxResults,

    #[error("date range start {start} is after end {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration document: {0}")]
    Malformed(#[source] serde_yaml::Error),

    #[error("strategy '{strategy}': {reason}")]
    InvalidStrategy { strategy: String, reason: String },

    #[error("strategy '{strategy}': field '{field}' {reason}")]
    InvalidField {
        strategy: String,
        field: &'static str,
        reason: String,
    },

    #[error("search_configuration.{field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("no search strategies defined")]
    NoStrategies,

    #[error("default strategy '{0}' is not defined in search_strategies")]
    UnknownDefaultStrategy(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("strategy '{name}' not found{}", did_you_mean(.suggestion, .available))]
pub struct StrategyNotFoundError {
    pub name: String,
    pub available: Vec<String>,
    pub suggestion: Option<String>,
}

fn did_you_mean(suggestion: &Option<String>, available: &[String]) -> String {
    let mut hint = String::new();
    if let Some(s) = suggestion {
        hint.push_str(&format!(" (did you mean '{}'?)", s));
    }
    if !available.is_empty() {
        hint.push_str(&format!("; available strategies: {}", available.join(", ")));
    }
    hint
}

/// Failures of a paper store. Transport errors are wrapped, never leaked.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{repository} is unreachable")]
    Unreachable {
        repository: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{repository} returned HTTP {status}")]
    Status {
        repository: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{repository} returned malformed data: {reason}")]
    Malformed {
        repository: &'static str,
        reason: String,
    },

    #[error("{repository} does not support {operation}")]
    Unsupported {
        repository: &'static str,
        operation: &'static str,
    },

    #[error("{0} is read-only")]
    ReadOnly(&'static str),

    #[error("paper store lock was poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    StrategyNotFound(#[from] StrategyNotFoundError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A single artifact fetch failure. Recorded per paper, never fatal.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("server returned an empty body")]
    Empty,
}

/// Batch-level failure that aborts the remaining downloads.
#[derive(Debug, Error)]
pub enum DownloadServiceError {
    #[error("output directory {} is not usable", .path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
