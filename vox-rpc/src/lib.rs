//! The RPC surface.
//!
//! A typed JSON-RPC dialect over the tool catalog with three methods —
//! `list_tools`, `call_tool`, `shutdown` — served over two transports:
//! line-delimited JSON on stdio (one message per line, for running as
//! a host's sub-process) and HTTP (`POST /rpc`, plus `GET /tools` for
//! the catalog). Long `call_tool` invocations may stream `progress`
//! notifications referencing the request id; exactly one `result` or
//! `error` terminates each call. Shutdown drains in-flight calls up to
//! a bounded deadline.

#![deny(missing_docs)]

mod http;
mod protocol;
mod server;
mod stdio;

pub use http::serve_http;
pub use protocol::{RpcError, RpcNotification, RpcRequest, RpcResponse};
pub use server::{RpcServer, DRAIN_DEADLINE};
pub use stdio::serve_stdio;
