//! The telepathist sidecar: derived summaries over one session's spans.
//!
//! Lives in a `*.telepathist.db` next to the session database, so a
//! review run can be regenerated or deleted without touching the raw
//! spans.

use crate::recorder::TelemetryError;
use crate::span::now_ns;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS turn_summaries (
    turn         INTEGER PRIMARY KEY,
    shortSummary TEXT NOT NULL,
    fullSummary  TEXT NOT NULL,
    model        TEXT NOT NULL,
    createdAt    INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS phase_summaries (
    fromTurn  INTEGER NOT NULL,
    toTurn    INTEGER NOT NULL,
    summary   TEXT NOT NULL,
    model     TEXT NOT NULL,
    createdAt INTEGER NOT NULL,
    PRIMARY KEY (fromTurn, toTurn)
);
CREATE TABLE IF NOT EXISTS summary_cache (
    cacheKey  TEXT PRIMARY KEY,
    result    TEXT NOT NULL,
    model     TEXT NOT NULL,
    createdAt INTEGER NOT NULL
);
";

/// One turn's summary pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    /// The turn.
    pub turn: u32,
    /// One-line summary.
    pub short_summary: String,
    /// Full paragraph.
    pub full_summary: String,
    /// Model that produced it.
    pub model: String,
}

/// A summary spanning a contiguous run of turns.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSummary {
    /// First turn covered.
    pub from_turn: u32,
    /// Last turn covered.
    pub to_turn: u32,
    /// The summary text.
    pub summary: String,
    /// Model that produced it.
    pub model: String,
}

/// Cache key for the summarizer: SHA-256 over instruction and text.
pub fn summary_cache_key(instruction: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(instruction.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Store for the telepathist's derived tables.
#[derive(Clone)]
pub struct TelepathistStore {
    conn: Arc<Mutex<Connection>>,
}

impl TelepathistStore {
    /// Open the sidecar for the given session database path
    /// (`game-1.db` → `game-1.telepathist.db`).
    pub fn open_for_session(session_db: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let session_db = session_db.as_ref();
        let stem = session_db
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string());
        let path: PathBuf = session_db.with_file_name(format!("{stem}.telepathist.db"));
        Self::open(path)
    }

    /// Open a sidecar database directly.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| TelemetryError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Upsert one turn summary.
    pub async fn put_turn_summary(&self, summary: TurnSummary) -> Result<(), TelemetryError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO turn_summaries (turn, shortSummary, fullSummary, model, createdAt)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (turn) DO UPDATE SET
                     shortSummary = excluded.shortSummary,
                     fullSummary = excluded.fullSummary,
                     model = excluded.model,
                     createdAt = excluded.createdAt",
                params![
                    summary.turn,
                    summary.short_summary,
                    summary.full_summary,
                    summary.model,
                    now_ns() / 1_000_000
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// All turn summaries, in turn order.
    pub async fn turn_summaries(&self) -> Result<Vec<TurnSummary>, TelemetryError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT turn, shortSummary, fullSummary, model
                 FROM turn_summaries ORDER BY turn",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(TurnSummary {
                    turn: row.get(0)?,
                    short_summary: row.get(1)?,
                    full_summary: row.get(2)?,
                    model: row.get(3)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Upsert one phase summary.
    pub async fn put_phase_summary(&self, summary: PhaseSummary) -> Result<(), TelemetryError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO phase_summaries (fromTurn, toTurn, summary, model, createdAt)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (fromTurn, toTurn) DO UPDATE SET
                     summary = excluded.summary,
                     model = excluded.model,
                     createdAt = excluded.createdAt",
                params![
                    summary.from_turn,
                    summary.to_turn,
                    summary.summary,
                    summary.model,
                    now_ns() / 1_000_000
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// All phase summaries, ordered by starting turn.
    pub async fn phase_summaries(&self) -> Result<Vec<PhaseSummary>, TelemetryError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT fromTurn, toTurn, summary, model
                 FROM phase_summaries ORDER BY fromTurn",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(PhaseSummary {
                    from_turn: row.get(0)?,
                    to_turn: row.get(1)?,
                    summary: row.get(2)?,
                    model: row.get(3)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Look up a cached summary result.
    pub async fn cache_get(&self, key: &str) -> Result<Option<String>, TelemetryError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT result FROM summary_cache WHERE cacheKey = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    /// Store a summary result.
    pub async fn cache_put(
        &self,
        key: &str,
        result: &str,
        model: &str,
    ) -> Result<(), TelemetryError> {
        let (key, result, model) = (key.to_string(), result.to_string(), model.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO summary_cache (cacheKey, result, model, createdAt)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (cacheKey) DO UPDATE SET
                     result = excluded.result,
                     model = excluded.model,
                     createdAt = excluded.createdAt",
                params![key, result, model, now_ns() / 1_000_000],
            )?;
            Ok(())
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, TelemetryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, TelemetryError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&conn)
        })
        .await
        .map_err(|e| TelemetryError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_and_input_sensitive() {
        let a = summary_cache_key("summarize", "the text");
        let b = summary_cache_key("summarize", "the text");
        let c = summary_cache_key("summarize", "other text");
        let d = summary_cache_key("condense", "the text");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn sidecar_path_sits_next_to_session_db() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("game-7.db");
        // Sidecar opens even when the session db does not exist yet.
        let store = TelepathistStore::open_for_session(&session).unwrap();
        store
            .put_turn_summary(TurnSummary {
                turn: 1,
                short_summary: "Settled the capital.".into(),
                full_summary: "Founded the capital and queued a scout.".into(),
                model: "m".into(),
            })
            .await
            .unwrap();
        assert!(dir.path().join("game-7.telepathist.db").exists());
    }

    #[tokio::test]
    async fn turn_and_phase_summaries_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TelepathistStore::open(dir.path().join("x.telepathist.db")).unwrap();

        store
            .put_turn_summary(TurnSummary {
                turn: 2,
                short_summary: "short".into(),
                full_summary: "full".into(),
                model: "m".into(),
            })
            .await
            .unwrap();
        store
            .put_phase_summary(PhaseSummary {
                from_turn: 1,
                to_turn: 10,
                summary: "expansion phase".into(),
                model: "m".into(),
            })
            .await
            .unwrap();

        let turns = store.turn_summaries().await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].turn, 2);
        let phases = store.phase_summaries().await.unwrap();
        assert_eq!(phases[0].to_turn, 10);
    }

    #[tokio::test]
    async fn summary_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TelepathistStore::open(dir.path().join("c.telepathist.db")).unwrap();
        let key = summary_cache_key("i", "t");
        assert!(store.cache_get(&key).await.unwrap().is_none());
        store.cache_put(&key, "the summary", "m").await.unwrap();
        assert_eq!(
            store.cache_get(&key).await.unwrap().as_deref(),
            Some("the summary")
        );
    }
}
