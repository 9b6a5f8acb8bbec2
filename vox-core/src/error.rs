//! Error taxonomy shared across every vox boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The uniform error classification. Every error that crosses a tool,
/// RPC, or pipeline boundary carries exactly one of these kinds.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Schema validation failure at a tool or RPC boundary.
    InvalidArgument,
    /// Entity absent: player not alive, city gone, tool name unknown.
    NotFound,
    /// A downstream component (bridge, model, disk) failed in a way the
    /// core cannot correct.
    DependencyFailed,
    /// [`ErrorKind::DependencyFailed`] specialized for the scripting
    /// channel, carrying the upstream error body unchanged.
    BridgeError,
    /// Deadline expired.
    Timeout,
    /// Caller requested abort.
    Cancelled,
    /// Invariant violated. Treated as a bug and logged with a backtrace.
    Internal,
}

impl ErrorKind {
    /// Stable wire code for this kind.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::NotFound => "not-found",
            ErrorKind::DependencyFailed => "dependency-failed",
            ErrorKind::BridgeError => "bridge-error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether an operation that failed with this kind may be retried.
    ///
    /// Only meaningful for idempotent operations (reads, health checks,
    /// registration). Writes are never automatically retried regardless
    /// of what this returns.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::DependencyFailed)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// The error type surfaced to RPC clients and recorded on spans.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct VoxError {
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail (upstream error bodies, offending input).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl VoxError {
    /// Create an error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Shorthand for an `invalid-argument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Shorthand for a `not-found` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for an `internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Convenience alias used across the workspace.
pub type VoxResult<T> = Result<T, VoxError>;

/// Errors from tool execution.
///
/// One variant per [`ErrorKind`] a tool may produce, so callers can match
/// without string inspection while the wire mapping stays uniform.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// The input failed schema validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested entity (or the tool itself) was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A downstream dependency failed.
    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    /// The scripting channel reported an error.
    #[error("bridge error {code}: {message}")]
    Bridge {
        /// Upstream error code (e.g. `SCRIPT_ERROR`, `UNKNOWN_FUNCTION`).
        code: String,
        /// Upstream error message.
        message: String,
        /// Upstream error body, unchanged.
        details: Option<serde_json::Value>,
    },

    /// The call deadline expired.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The caller cancelled the call.
    #[error("cancelled")]
    Cancelled,

    /// An invariant was violated inside the tool.
    #[error("internal: {0}")]
    Internal(String),
}

impl ToolError {
    /// The uniform kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ToolError::NotFound(_) => ErrorKind::NotFound,
            ToolError::DependencyFailed(_) => ErrorKind::DependencyFailed,
            ToolError::Bridge { .. } => ErrorKind::BridgeError,
            ToolError::Timeout(_) => ErrorKind::Timeout,
            ToolError::Cancelled => ErrorKind::Cancelled,
            ToolError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<ToolError> for VoxError {
    fn from(e: ToolError) -> Self {
        let details = match &e {
            ToolError::Bridge { details, .. } => details.clone(),
            _ => None,
        };
        VoxError {
            kind: e.kind(),
            message: e.to_string(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(ErrorKind::InvalidArgument.code(), "invalid-argument");
        assert_eq!(ErrorKind::NotFound.code(), "not-found");
        assert_eq!(ErrorKind::DependencyFailed.code(), "dependency-failed");
        assert_eq!(ErrorKind::BridgeError.code(), "bridge-error");
        assert_eq!(ErrorKind::Timeout.code(), "timeout");
        assert_eq!(ErrorKind::Cancelled.code(), "cancelled");
        assert_eq!(ErrorKind::Internal.code(), "internal");
    }

    #[test]
    fn kind_serde_matches_code() {
        for kind in [
            ErrorKind::InvalidArgument,
            ErrorKind::NotFound,
            ErrorKind::DependencyFailed,
            ErrorKind::BridgeError,
            ErrorKind::Timeout,
            ErrorKind::Cancelled,
            ErrorKind::Internal,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.code().into()));
        }
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::DependencyFailed.is_retryable());
        assert!(!ErrorKind::InvalidArgument.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
        assert!(!ErrorKind::Internal.is_retryable());
    }

    #[test]
    fn tool_error_maps_to_kinds() {
        assert_eq!(
            ToolError::InvalidArgument("x".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(ToolError::Cancelled.kind(), ErrorKind::Cancelled);
        let bridge = ToolError::Bridge {
            code: "SCRIPT_ERROR".into(),
            message: "nil value".into(),
            details: Some(serde_json::json!({"line": 3})),
        };
        assert_eq!(bridge.kind(), ErrorKind::BridgeError);
        let vox: VoxError = bridge.into();
        assert_eq!(vox.kind, ErrorKind::BridgeError);
        assert_eq!(vox.details.unwrap()["line"], 3);
    }

    #[test]
    fn vox_error_display() {
        let e = VoxError::not_found("player 7 not alive");
        assert_eq!(e.to_string(), "not-found: player 7 not alive");
    }
}
