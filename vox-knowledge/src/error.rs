//! Knowledge store errors.

use thiserror::Error;
use vox_core::{ErrorKind, VoxError};

/// Errors from the knowledge store.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// The database could not be opened or migrated.
    #[error("cannot open knowledge store {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: String,
        /// Underlying sqlite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A read or write failed.
    #[error("knowledge query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// A payload could not be serialized or deserialized.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking-pool task was dropped.
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<KnowledgeError> for VoxError {
    fn from(e: KnowledgeError) -> Self {
        VoxError::new(ErrorKind::DependencyFailed, e.to_string())
    }
}
