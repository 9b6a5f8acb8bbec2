//! Transport-independent request handling.

use crate::protocol::{RpcError, RpcNotification, RpcRequest, RpcResponse};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use vox_core::{PlayerId, ToolContext, ToolRegistry};

/// How long shutdown waits for in-flight calls before forcing close.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
    /// Optional viewer player for visibility-scoped reads.
    #[serde(default)]
    player: Option<u8>,
    /// Optional turn context for write audits.
    #[serde(default)]
    turn: Option<u32>,
}

/// The method handler shared by both transports.
///
/// Cloning shares the registry, the shutdown token, and the in-flight
/// tracker.
#[derive(Clone)]
pub struct RpcServer {
    tools: ToolRegistry,
    shutdown: CancellationToken,
    inflight: TaskTracker,
}

impl RpcServer {
    /// Build a server over the tool catalog.
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            shutdown: CancellationToken::new(),
            inflight: TaskTracker::new(),
        }
    }

    /// Token transports watch to stop accepting work.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Drain in-flight calls up to [`DRAIN_DEADLINE`], then return.
    pub async fn drain(&self) {
        self.inflight.close();
        if tokio::time::timeout(DRAIN_DEADLINE, self.inflight.wait())
            .await
            .is_err()
        {
            tracing::warn!("drain deadline expired, forcing shutdown");
        }
    }

    /// The tool list as served to clients.
    pub fn tool_list(&self) -> serde_json::Value {
        let tools: Vec<serde_json::Value> = self
            .tools
            .iter()
            .map(|tool| {
                let annotations = tool.annotations();
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                    "outputSchema": tool.output_schema(),
                    "annotations": {
                        "readOnly": annotations.read_only,
                        "autoComplete": annotations.auto_complete,
                        "markdownConfig": annotations.markdown,
                    },
                })
            })
            .collect();
        serde_json::json!({"tools": tools})
    }

    /// Handle one request. `notify` receives progress notifications for
    /// long calls; transports that cannot stream pass a drop-only
    /// channel.
    ///
    /// Returns `None` for id-less requests.
    pub async fn handle(
        &self,
        request: RpcRequest,
        notify: mpsc::Sender<RpcNotification>,
    ) -> Option<RpcResponse> {
        let id = request.id.clone()?;
        let response = match request.method.as_str() {
            "list_tools" => RpcResponse::ok(id, self.tool_list()),
            "call_tool" => self.call_tool(id, request.params, notify).await,
            "shutdown" => {
                tracing::info!("shutdown requested over rpc");
                self.shutdown.cancel();
                RpcResponse::ok(id, serde_json::json!({"ok": true}))
            }
            other => RpcResponse::err(
                id,
                RpcError {
                    code: "not-found".into(),
                    message: format!("unknown method: {other}"),
                    details: None,
                },
            ),
        };
        Some(response)
    }

    async fn call_tool(
        &self,
        id: serde_json::Value,
        params: serde_json::Value,
        notify: mpsc::Sender<RpcNotification>,
    ) -> RpcResponse {
        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return RpcResponse::err(
                    id,
                    RpcError {
                        code: "invalid-argument".into(),
                        message: format!("bad call_tool params: {e}"),
                        details: None,
                    },
                );
            }
        };

        let Some(tool) = self.tools.get(&params.name) else {
            return RpcResponse::err(
                id,
                RpcError {
                    code: "not-found".into(),
                    message: format!("unknown tool: {}", params.name),
                    details: None,
                },
            );
        };

        let _ = notify
            .send(RpcNotification::progress(&id, "running"))
            .await;

        let ctx = ToolContext {
            player: params.player.map(PlayerId),
            turn: params.turn,
            mode: None,
            deadline: None,
        };
        match tool.call(ctx, params.arguments).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err(e) => {
                let code = e.kind().code().to_string();
                RpcResponse::err(
                    id,
                    RpcError {
                        code,
                        message: e.to_string(),
                        details: None,
                    },
                )
            }
        }
    }

    /// Track a transport task so shutdown can drain it.
    pub fn track<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inflight.spawn(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use vox_core::{ToolDyn, ToolError, ToolFuture};

    struct EchoTool;

    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn output_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(&self, ctx: ToolContext, input: serde_json::Value) -> ToolFuture<'_> {
            Box::pin(async move {
                Ok(json!({"echoed": input, "viewer": ctx.player.map(|p| p.0)}))
            })
        }
    }

    struct FailTool;

    impl ToolDyn for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn output_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(&self, _ctx: ToolContext, _input: serde_json::Value) -> ToolFuture<'_> {
            Box::pin(async { Err(ToolError::NotFound("city is gone".into())) })
        }
    }

    fn server() -> RpcServer {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FailTool));
        RpcServer::new(registry)
    }

    fn sink() -> mpsc::Sender<RpcNotification> {
        mpsc::channel(8).0
    }

    #[tokio::test]
    async fn list_tools_includes_schemas_and_annotations() {
        let server = server();
        let response = server
            .handle(
                RpcRequest {
                    id: Some(json!(1)),
                    method: "list_tools".into(),
                    params: json!(null),
                },
                sink(),
            )
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.get("inputSchema").is_some()));
        assert!(tools.iter().all(|t| t.get("annotations").is_some()));
    }

    #[tokio::test]
    async fn call_tool_roundtrip_with_player_context() {
        let server = server();
        let (tx, mut rx) = mpsc::channel(8);
        let response = server
            .handle(
                RpcRequest {
                    id: Some(json!("r1")),
                    method: "call_tool".into(),
                    params: json!({"name": "echo", "arguments": {"x": 1}, "player": 3}),
                },
                tx,
            )
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["viewer"], 3);
        // One progress notification referenced the request id.
        let note = rx.recv().await.unwrap();
        assert_eq!(note.params["id"], "r1");
    }

    #[tokio::test]
    async fn tool_error_kind_becomes_wire_code() {
        let server = server();
        let response = server
            .handle(
                RpcRequest {
                    id: Some(json!(4)),
                    method: "call_tool".into(),
                    params: json!({"name": "fail", "arguments": {}}),
                },
                sink(),
            )
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, "not-found");
    }

    #[tokio::test]
    async fn unknown_method_and_tool_are_not_found() {
        let server = server();
        let response = server
            .handle(
                RpcRequest {
                    id: Some(json!(5)),
                    method: "mystery".into(),
                    params: json!(null),
                },
                sink(),
            )
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, "not-found");

        let response = server
            .handle(
                RpcRequest {
                    id: Some(json!(6)),
                    method: "call_tool".into(),
                    params: json!({"name": "missing"}),
                },
                sink(),
            )
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, "not-found");
    }

    #[tokio::test]
    async fn idless_requests_get_no_response() {
        let server = server();
        let response = server
            .handle(
                RpcRequest {
                    id: None,
                    method: "list_tools".into(),
                    params: json!(null),
                },
                sink(),
            )
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn shutdown_cancels_the_token() {
        let server = server();
        let token = server.shutdown_token();
        assert!(!token.is_cancelled());
        server
            .handle(
                RpcRequest {
                    id: Some(json!(9)),
                    method: "shutdown".into(),
                    params: json!(null),
                },
                sink(),
            )
            .await
            .unwrap();
        assert!(token.is_cancelled());
    }
}
