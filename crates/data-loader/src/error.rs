//! Error types for the data-loader crate.
//!
//! Two families live here:
//! - `DataLoadError` for parsing and validating the dataset on disk
//! - `StoreError` for reads through the `StoreReader` seam at request time

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during data loading and parsing
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// File could not be found or opened
    #[error("Failed to open file: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Line in data file couldn't be parsed
    #[error("Parse error at line {line} in {file}: {reason}")]
    ParseError {
        file: String,
        line: usize,
        reason: String,
    },

    /// A data field had an invalid value
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Referenced entity doesn't exist (e.g., purchase of a non-existent product)
    #[error("Missing reference: {entity} with id {id}")]
    MissingReference { entity: String, id: String },

    /// Data validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;

/// Errors reported by a `StoreReader`.
///
/// `Clone` so a single failed computation can be handed to every caller
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// User or product identifier does not resolve
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Backing store refused or failed the call
    #[error("store unavailable during {operation}: {reason}")]
    Unavailable {
        operation: &'static str,
        reason: String,
    },

    /// Backing store did not answer in time
    #[error("store call {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl StoreError {
    pub fn user_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: "user",
            id: id.into(),
        }
    }

    pub fn product_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: "product",
            id: id.into(),
        }
    }

    /// Name of the store operation that failed, if the error came from one.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            StoreError::NotFound { .. } => None,
            StoreError::Unavailable { operation, .. } | StoreError::Timeout { operation, .. } => {
                Some(operation)
            }
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
