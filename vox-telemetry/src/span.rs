//! The span record.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use vox_core::{SessionId, SpanId, TraceId};

/// Terminal status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    /// Completed normally.
    Ok,
    /// Completed with an error.
    Error,
}

/// One agent-call span, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Session (game identity) this span belongs to.
    pub context_id: SessionId,
    /// Turn the work happened on.
    pub turn: u32,
    /// Trace: one turn-pipeline execution.
    pub trace_id: TraceId,
    /// This span.
    pub span_id: SpanId,
    /// Enclosing span, if any.
    pub parent_span_id: Option<SpanId>,
    /// Span name (agent name, tool name, `llm.step`).
    pub name: String,
    /// Start time, nanoseconds since the epoch.
    pub start_time_ns: i64,
    /// End time, nanoseconds since the epoch.
    pub end_time_ns: i64,
    /// Structured attributes (step count, tool-call list, token usage…).
    pub attributes: serde_json::Value,
    /// Terminal status.
    pub status: SpanStatus,
    /// Status detail when `status` is `Error`.
    pub status_message: Option<String>,
}

impl SpanRecord {
    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.end_time_ns - self.start_time_ns) / 1_000_000
    }
}

/// Nanoseconds since the Unix epoch.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// A fresh random 64-bit span id, hex-encoded.
pub fn new_span_id() -> SpanId {
    SpanId::new(format!("{:016x}", rand::thread_rng().r#gen::<u64>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_millis() {
        let span = SpanRecord {
            context_id: SessionId::new("s"),
            turn: 1,
            trace_id: TraceId::new("t"),
            span_id: SpanId::new("sp"),
            parent_span_id: None,
            name: "strategist".into(),
            start_time_ns: 1_000_000_000,
            end_time_ns: 1_250_000_000,
            attributes: serde_json::Value::Null,
            status: SpanStatus::Ok,
            status_message: None,
        };
        assert_eq!(span.duration_ms(), 250);
    }

    #[test]
    fn span_ids_are_unique_hex() {
        let a = new_span_id();
        let b = new_span_id();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
