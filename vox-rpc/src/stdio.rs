//! Line-delimited stdio transport: one JSON object per line, both
//! directions. Responses and notifications share one writer task so
//! output lines never interleave.

use crate::protocol::{RpcRequest, ServerMessage};
use crate::server::RpcServer;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Serve until stdin closes or a `shutdown` request arrives, then
/// drain.
pub async fn serve_stdio(server: RpcServer) -> std::io::Result<()> {
    serve_lines(server, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Transport core, generic over the byte streams for testability.
pub(crate) async fn serve_lines<R, W>(
    server: RpcServer,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);

    // Single writer: response and notification lines never interleave.
    let writer = async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(mut line) = serde_json::to_string(&message) else {
                continue;
            };
            line.push('\n');
            if output.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = output.flush().await;
        }
    };

    let reader = async {
        let shutdown = server.shutdown_token();
        let mut lines = BufReader::new(input).lines();

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            let request: RpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable rpc line");
                    continue;
                }
            };

            let server_for_call = server.clone();
            let out = out_tx.clone();
            server.track(async move {
                // Forward progress notifications onto the shared writer.
                let (note_tx, mut note_rx) = mpsc::channel(8);
                let note_out = out.clone();
                let forwarder = tokio::spawn(async move {
                    while let Some(note) = note_rx.recv().await {
                        let _ = note_out.send(ServerMessage::Notification(note)).await;
                    }
                });

                let response = server_for_call.handle(request, note_tx).await;
                forwarder.await.ok();
                if let Some(response) = response {
                    let _ = out.send(ServerMessage::Response(response)).await;
                }
            });
        }

        server.drain().await;
        drop(out_tx);
        Ok::<(), std::io::Error>(())
    };

    let (read_result, ()) = tokio::join!(reader, writer);
    read_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use vox_core::{ToolContext, ToolDyn, ToolFuture, ToolRegistry};

    struct PingTool;

    impl ToolDyn for PingTool {
        fn name(&self) -> &str {
            "ping"
        }
        fn description(&self) -> &str {
            "pong"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn output_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(&self, _ctx: ToolContext, _input: serde_json::Value) -> ToolFuture<'_> {
            Box::pin(async { Ok(json!({"pong": true})) })
        }
    }

    #[tokio::test]
    async fn stdio_roundtrip_line_per_message() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PingTool));
        let server = RpcServer::new(registry);

        let input = b"{\"id\": 1, \"method\": \"list_tools\"}\n\
                      {\"id\": 2, \"method\": \"call_tool\", \"params\": {\"name\": \"ping\"}}\n"
            .to_vec();
        let mut output = Vec::new();

        serve_lines(server, &input[..], &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // list_tools response, progress notification, call response —
        // each on its own line, each valid JSON.
        assert!(lines.len() >= 3);
        let parsed: Vec<serde_json::Value> = lines
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        let list = parsed
            .iter()
            .find(|v| v.get("id") == Some(&json!(1)))
            .unwrap();
        assert_eq!(list["result"]["tools"][0]["name"], "ping");

        let call = parsed
            .iter()
            .find(|v| v.get("id") == Some(&json!(2)))
            .unwrap();
        assert_eq!(call["result"]["pong"], true);

        let progress = parsed
            .iter()
            .find(|v| v.get("method") == Some(&json!("progress")))
            .unwrap();
        assert_eq!(progress["params"]["id"], 2);
    }

    #[tokio::test]
    async fn shutdown_request_stops_the_loop() {
        let server = RpcServer::new(ToolRegistry::new());
        // No trailing newline after shutdown: the loop must exit from
        // the token, not EOF.
        let input = b"{\"id\": 1, \"method\": \"shutdown\"}\n".to_vec();
        let mut output = Vec::new();
        serve_lines(server, &input[..], &mut output)
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("\"ok\":true"));
    }
}
