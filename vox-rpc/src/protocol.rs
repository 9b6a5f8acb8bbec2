//! Wire message shapes.

use serde::{Deserialize, Serialize};
use vox_core::VoxError;

/// A request: `{id?, method, params?}`. Requests without an id get no
/// response (fire-and-forget notifications from the client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id, echoed on the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Method name: `list_tools`, `call_tool`, or `shutdown`.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Error body: `{code, message, details?}` with the uniform error
/// codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Stable error code (`invalid-argument`, `not-found`, …).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<VoxError> for RpcError {
    fn from(e: VoxError) -> Self {
        Self {
            code: e.kind.code().to_string(),
            message: e.message,
            details: e.details,
        }
    }
}

/// A terminal response: exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Correlation id of the request.
    pub id: serde_json::Value,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// A success response.
    pub fn ok(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// An error response.
    pub fn err(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A server→client notification, e.g. progress on a long `call_tool`:
/// `{method: "progress", params: {id, stage}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    /// Notification method name.
    pub method: String,
    /// Notification payload; progress notifications carry the
    /// originating request id.
    pub params: serde_json::Value,
}

impl RpcNotification {
    /// A progress notification for the given request.
    pub fn progress(request_id: &serde_json::Value, stage: &str) -> Self {
        Self {
            method: "progress".into(),
            params: serde_json::json!({"id": request_id, "stage": stage}),
        }
    }
}

/// Anything the server can send.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Terminal response.
    Response(RpcResponse),
    /// In-flight notification.
    Notification(RpcNotification),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_parses_without_id() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"method": "list_tools"}"#).unwrap();
        assert!(request.id.is_none());
        assert_eq!(request.method, "list_tools");
        assert!(request.params.is_null());
    }

    #[test]
    fn response_has_exactly_one_terminal_field() {
        let ok = RpcResponse::ok(json!(1), json!({"tools": []}));
        let value = serde_json::to_value(&ok).unwrap();
        assert!(value.get("result").is_some());
        assert!(value.get("error").is_none());

        let err = RpcResponse::err(
            json!(2),
            RpcError {
                code: "not-found".into(),
                message: "no such tool".into(),
                details: None,
            },
        );
        let value = serde_json::to_value(&err).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], "not-found");
    }

    #[test]
    fn progress_references_request_id() {
        let note = RpcNotification::progress(&json!("req-9"), "running");
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["method"], "progress");
        assert_eq!(value["params"]["id"], "req-9");
    }
}
