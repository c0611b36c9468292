//! Error taxonomy shared by every stage of the transit pipeline.
//!
//! Each error carries a machine-readable [`ErrorKind`] alongside its
//! human-readable message so that callers (the HTTP service, the Python
//! bindings) can branch on the kind without parsing text.

use serde::{Deserialize, Serialize};

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TransitError>;

/// Machine-readable classification of a [`TransitError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FormatError,
    EmptyDataError,
    InvalidConfigError,
    SearchTimeoutError,
    IoError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FormatError => "format_error",
            ErrorKind::EmptyDataError => "empty_data_error",
            ErrorKind::InvalidConfigError => "invalid_config_error",
            ErrorKind::SearchTimeoutError => "search_timeout_error",
            ErrorKind::IoError => "io_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while ingesting, cleaning or searching a light
/// curve.
#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    /// Missing or malformed required columns, headers or cells.
    #[error("format error: {0}")]
    Format(String),

    /// No usable samples after parsing or cleaning, or no valid
    /// periodogram points.
    #[error("empty data: {0}")]
    EmptyData(String),

    /// Degenerate search configuration or numerically degenerate input.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The evaluation budget ran out before any grid point was evaluated.
    #[error("search budget exhausted after {evaluated} of {grid_size} grid points")]
    SearchTimeout { evaluated: usize, grid_size: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitError::Format(_) => ErrorKind::FormatError,
            TransitError::EmptyData(_) => ErrorKind::EmptyDataError,
            TransitError::InvalidConfig(_) => ErrorKind::InvalidConfigError,
            TransitError::SearchTimeout { .. } => ErrorKind::SearchTimeoutError,
            TransitError::Io(_) => ErrorKind::IoError,
        }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        TransitError::Format(msg.into())
    }

    pub(crate) fn empty(msg: impl Into<String>) -> Self {
        TransitError::EmptyData(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        TransitError::InvalidConfig(msg.into())
    }
}

impl From<csv::Error> for TransitError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(io) => TransitError::Io(io),
                other => TransitError::Format(format!("{:?}", other)),
            }
        } else {
            TransitError::Format(err.to_string())
        }
    }
}
