//! Telemetry: agent-call spans persisted per session.
//!
//! Every agent run, tool call, and model step produces a span. Spans go
//! two places: a [`tracing`] event for live observation, and a
//! per-session SQLite database (`telemetry/<context-root>/<context-id>.db`)
//! for post-hoc analysis. Segregating databases by game identity lets
//! the telepathist review exactly one session without interference.
//!
//! The telepathist's own derived tables (turn summaries, phase
//! summaries, summary cache) live in a `*.telepathist.db` sidecar next
//! to the session database.

#![deny(missing_docs)]

mod recorder;
mod sidecar;
mod span;

pub use recorder::{SpanQuery, SpanRecorder, TelemetryError, read_spans};
pub use sidecar::{PhaseSummary, TelepathistStore, TurnSummary, summary_cache_key};
pub use span::{SpanRecord, SpanStatus, new_span_id, now_ns};
