// ABOUTME: Error types for the ttirc store adapter using thiserror.
// ABOUTME: Separates startup failures from transient unavailability during ticks.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while talking to the database.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to create the directory holding the database file.
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open the database or initialise its schema.
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    /// A query failed while the master was running.
    #[error("store unavailable during {operation}: {source}")]
    Unavailable {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    /// Whether the next tick may succeed without operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    pub(crate) fn unavailable(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| StoreError::Unavailable { operation, source }
    }
}

/// Result type alias using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;
