//! Error types for the record store, the controller and the session manager.

use std::path::PathBuf;

use thiserror::Error;

use crate::chart::ChartError;
use crate::models::{UnknownColumn, ValidationError};
use crate::session::DocumentId;

/// Everything the core can report back to a front end.
#[derive(Debug, Error)]
pub enum StoreError {
    // I/O errors
    #[error("failed to {operation} {}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to replace {} with {}", .target_path.display(), .temp_path.display())]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to serialize records")]
    Serialization(#[source] serde_json::Error),

    #[error(transparent)]
    Chart(#[from] ChartError),

    // Validation errors
    #[error("invalid manufacturer: {0}")]
    Validation(#[from] ValidationError),

    // Logical errors
    #[error("manufacturer {0} not found")]
    NotFound(u32),

    #[error("invalid index {index} (have {len} records)")]
    InvalidIndex { index: usize, len: usize },

    #[error(transparent)]
    UnknownColumn(#[from] UnknownColumn),

    #[error("document has no file path; use save as")]
    Unbound,

    #[error("document {0} is not open")]
    DocumentNotFound(DocumentId),

    #[error("records changed since revision {expected} (now {actual})")]
    Stale { expected: u64, actual: u64 },

    #[error("no manufacturer ids left to assign")]
    IdSpaceExhausted,
}

impl StoreError {
    pub(crate) fn io(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::NotFound(7);
        assert_eq!(err.to_string(), "manufacturer 7 not found");

        let err = StoreError::InvalidIndex { index: 3, len: 2 };
        assert_eq!(err.to_string(), "invalid index 3 (have 2 records)");

        let err = StoreError::from(UnknownColumn("salary".into()));
        assert_eq!(err.to_string(), "unknown column: salary");

        let err = StoreError::io(
            "open",
            "data.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "failed to open data.csv");

        let err = StoreError::Stale {
            expected: 4,
            actual: 5,
        };
        assert_eq!(err.to_string(), "records changed since revision 4 (now 5)");
    }
}
