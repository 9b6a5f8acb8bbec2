//! Gateway errors.

use thiserror::Error;
use vox_core::{ErrorKind, VoxError};

/// Errors from the database gateway.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A database file could not be opened. Fatal at initialization.
    #[error("cannot open database {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: String,
        /// Underlying sqlite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A query failed.
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// The blocking-pool task running the query was dropped.
    #[error("query task failed: {0}")]
    Task(String),
}

impl From<GatewayError> for VoxError {
    fn from(e: GatewayError) -> Self {
        VoxError::new(ErrorKind::DependencyFailed, e.to_string())
    }
}
