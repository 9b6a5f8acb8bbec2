//! Bridge client errors.

use thiserror::Error;
use vox_core::ToolError;

/// Errors from the bridge client and the remote-function registry.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge could not be reached.
    #[error("bridge unreachable: {0}")]
    Network(String),

    /// The call deadline expired. Distinct from [`BridgeError::Network`]
    /// so retry policy can tell them apart.
    #[error("bridge call timed out: {0}")]
    Timeout(String),

    /// The bridge reported a script failure; the upstream body is
    /// carried unchanged.
    #[error("script error {code}: {message}")]
    Script {
        /// Upstream error code (`SCRIPT_ERROR`, `UNKNOWN_FUNCTION`, …).
        code: String,
        /// Upstream message.
        message: String,
        /// Upstream detail body.
        details: Option<serde_json::Value>,
    },

    /// Registering a function failed.
    #[error("registration of {name} failed: {message}")]
    Registration {
        /// Function name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// A second registration under the same name used a different body.
    #[error("function {0} already registered with a different script")]
    FunctionConflict(String),

    /// The bridge returned something unparseable.
    #[error("invalid bridge response: {0}")]
    InvalidResponse(String),
}

impl BridgeError {
    /// Upstream code for script errors, if any.
    pub fn script_code(&self) -> Option<&str> {
        match self {
            BridgeError::Script { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<BridgeError> for ToolError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Timeout(msg) => ToolError::Timeout(msg),
            BridgeError::Script {
                code,
                message,
                details,
            } => ToolError::Bridge {
                code,
                message,
                details,
            },
            other => ToolError::DependencyFailed(other.to_string()),
        }
    }
}
