//! Buffered span persistence.

use crate::span::{SpanRecord, SpanStatus};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use vox_core::{SessionId, SpanId, TraceId};

/// Telemetry errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The session database could not be opened.
    #[error("cannot open telemetry db {path}: {source}")]
    Open {
        /// Path that failed.
        path: String,
        /// Underlying sqlite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A query failed.
    #[error("telemetry query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Attribute serialization failed.
    #[error("attribute serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The writer has shut down.
    #[error("telemetry writer closed")]
    Closed,

    /// Blocking task failed.
    #[error("telemetry task failed: {0}")]
    Task(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS spans (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    contextId     TEXT NOT NULL,
    turn          INTEGER NOT NULL,
    traceId       TEXT NOT NULL,
    spanId        TEXT NOT NULL,
    parentSpanId  TEXT,
    name          TEXT NOT NULL,
    startTime     INTEGER NOT NULL,
    endTime       INTEGER NOT NULL,
    durationMs    INTEGER NOT NULL,
    attributes    TEXT NOT NULL,
    statusCode    TEXT NOT NULL,
    statusMessage TEXT
);
CREATE INDEX IF NOT EXISTS idx_spans_context ON spans (contextId);
CREATE INDEX IF NOT EXISTS idx_spans_turn ON spans (turn);
CREATE INDEX IF NOT EXISTS idx_spans_trace ON spans (traceId);
CREATE INDEX IF NOT EXISTS idx_spans_parent ON spans (parentSpanId);
CREATE INDEX IF NOT EXISTS idx_spans_start ON spans (startTime);
";

enum Msg {
    Record(Box<SpanRecord>),
    Flush(oneshot::Sender<()>),
}

/// Filter for span reads.
#[derive(Debug, Clone, Default)]
pub struct SpanQuery {
    /// Only spans of this turn.
    pub turn: Option<u32>,
    /// Only spans of this trace.
    pub trace_id: Option<TraceId>,
    /// Only spans whose name equals this.
    pub name: Option<String>,
    /// Row cap.
    pub limit: Option<usize>,
}

/// Writes spans to one session's database through a dedicated writer
/// thread; `record` never blocks the caller.
#[derive(Clone)]
pub struct SpanRecorder {
    tx: mpsc::UnboundedSender<Msg>,
    path: PathBuf,
}

impl SpanRecorder {
    /// Open `telemetry_root/context_root/context_id.db` (creating
    /// directories as needed) and start the writer.
    pub fn open(
        telemetry_root: impl AsRef<Path>,
        context_root: &str,
        context_id: &SessionId,
    ) -> Result<Self, TelemetryError> {
        let dir = telemetry_root.as_ref().join(context_root);
        std::fs::create_dir_all(&dir).map_err(|e| TelemetryError::Task(e.to_string()))?;
        let path = dir.join(format!("{}.db", context_id.as_str()));

        let conn = Connection::open(&path).map_err(|source| TelemetryError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("vox-span-writer".into())
            .spawn(move || writer_loop(conn, rx))
            .map_err(|e| TelemetryError::Task(e.to_string()))?;

        Ok(Self { tx, path })
    }

    /// The session database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enqueue a span for persistence and mirror it as a tracing event.
    pub fn record(&self, span: SpanRecord) {
        tracing::debug!(
            name = %span.name,
            turn = span.turn,
            trace = %span.trace_id,
            status = ?span.status,
            duration_ms = span.duration_ms(),
            "span recorded"
        );
        if self.tx.send(Msg::Record(Box::new(span))).is_err() {
            tracing::warn!("span writer gone, span dropped");
        }
    }

    /// Wait until every span enqueued so far has hit the database.
    pub async fn flush(&self) -> Result<(), TelemetryError> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Msg::Flush(done))
            .map_err(|_| TelemetryError::Closed)?;
        wait.await.map_err(|_| TelemetryError::Closed)
    }

    /// Read spans back (used by the telepathist and by tests). Opens a
    /// separate read connection so the writer is undisturbed.
    pub async fn query(&self, query: SpanQuery) -> Result<Vec<SpanRecord>, TelemetryError> {
        read_spans(self.path.clone(), query).await
    }
}

/// Read spans from any session database, without a live recorder.
pub async fn read_spans(
    path: PathBuf,
    query: SpanQuery,
) -> Result<Vec<SpanRecord>, TelemetryError> {
    tokio::task::spawn_blocking(move || {
        let conn = Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .map_err(|source| TelemetryError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let mut stmt = conn.prepare(
            "SELECT contextId, turn, traceId, spanId, parentSpanId, name,
                    startTime, endTime, attributes, statusCode, statusMessage
             FROM spans
             WHERE (?1 IS NULL OR turn = ?1)
               AND (?2 IS NULL OR traceId = ?2)
               AND (?3 IS NULL OR name = ?3)
             ORDER BY startTime
             LIMIT ?4",
        )?;
        let limit = query.limit.map_or(i64::MAX, |l| l as i64);
        let rows = stmt.query_map(
            params![
                query.turn,
                query.trace_id.as_ref().map(|t| t.as_str().to_string()),
                query.name,
                limit
            ],
            |row| {
                let status: String = row.get(9)?;
                Ok(SpanRecord {
                    context_id: SessionId::new(row.get::<_, String>(0)?),
                    turn: row.get(1)?,
                    trace_id: TraceId::new(row.get::<_, String>(2)?),
                    span_id: SpanId::new(row.get::<_, String>(3)?),
                    parent_span_id: row
                        .get::<_, Option<String>>(4)?
                        .map(SpanId::new),
                    name: row.get(5)?,
                    start_time_ns: row.get(6)?,
                    end_time_ns: row.get(7)?,
                    attributes: serde_json::from_str(&row.get::<_, String>(8)?)
                        .unwrap_or(serde_json::Value::Null),
                    status: if status == "ok" {
                        SpanStatus::Ok
                    } else {
                        SpanStatus::Error
                    },
                    status_message: row.get(10)?,
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
    .await
    .map_err(|e| TelemetryError::Task(e.to_string()))?
}

fn writer_loop(conn: Connection, mut rx: mpsc::UnboundedReceiver<Msg>) {
    while let Some(msg) = rx.blocking_recv() {
        match msg {
            Msg::Record(span) => {
                let attributes = serde_json::to_string(&span.attributes)
                    .unwrap_or_else(|_| "null".to_string());
                let status = match span.status {
                    SpanStatus::Ok => "ok",
                    SpanStatus::Error => "error",
                };
                let result = conn.execute(
                    "INSERT INTO spans
                         (contextId, turn, traceId, spanId, parentSpanId, name,
                          startTime, endTime, durationMs, attributes, statusCode,
                          statusMessage)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        span.context_id.as_str(),
                        span.turn,
                        span.trace_id.as_str(),
                        span.span_id.as_str(),
                        span.parent_span_id.as_ref().map(|s| s.as_str().to_string()),
                        span.name,
                        span.start_time_ns,
                        span.end_time_ns,
                        span.duration_ms(),
                        attributes,
                        status,
                        span.status_message,
                    ],
                );
                if let Err(e) = result {
                    tracing::error!(error = %e, "span insert failed");
                }
            }
            Msg::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
