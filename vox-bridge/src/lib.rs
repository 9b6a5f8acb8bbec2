//! Client side of the native game bridge.
//!
//! The bridge is an external process the game loads. It compiles and
//! runs scripts (`POST /script/exec`), invokes previously registered
//! functions (`POST /script/call`), reports liveness (`GET /health`),
//! and emits game events as server-sent events (`GET /events`).
//!
//! This crate offers the typed call surface over two connection pools
//! (standard and low-latency), a broadcast event subscription with
//! exponential-backoff reconnect, the bounded event buffer with its
//! turn-start-preserving drop policy, and the remote-function registry
//! that installs named scripts on first use and re-installs them after
//! a reconnect.

#![deny(missing_docs)]

mod client;
mod error;
mod events;
mod registry;

pub use client::{BridgeClient, HealthStatus, ScriptOutcome, FAST_DEADLINE, STANDARD_DEADLINE};
pub use error::BridgeError;
pub use events::{BridgeEvent, CONNECTED_EVENT, EventBroker, EventBuffer, TURN_START_EVENT};
pub use registry::{FunctionRegistry, RemoteFunction};
