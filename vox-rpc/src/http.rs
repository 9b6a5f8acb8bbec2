//! HTTP transport: `POST /rpc` for the message shape, `GET /tools` for
//! the catalog. Serves any number of concurrent clients; progress
//! notifications are not streamed over plain HTTP (each POST gets its
//! terminal response only).

use crate::protocol::RpcRequest;
use crate::server::RpcServer;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;

/// Build the router; exposed for in-process testing.
pub(crate) fn router(server: RpcServer) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/tools", get(handle_tools))
        .with_state(server)
}

async fn handle_rpc(
    State(server): State<RpcServer>,
    Json(request): Json<RpcRequest>,
) -> impl IntoResponse {
    // HTTP cannot stream notifications mid-request; sink them.
    let (tx, mut rx) = mpsc::channel(8);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    match server.handle(request, tx).await {
        Some(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        None => (StatusCode::NO_CONTENT, Json(serde_json::Value::Null)),
    }
}

async fn handle_tools(State(server): State<RpcServer>) -> impl IntoResponse {
    Json(server.tool_list())
}

/// Serve on the given port until the server's shutdown token fires,
/// then drain in-flight calls.
pub async fn serve_http(server: RpcServer, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "rpc http transport listening");
    let shutdown = server.shutdown_token();
    let app = router(server.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    server.drain().await;
    Ok(())
}
