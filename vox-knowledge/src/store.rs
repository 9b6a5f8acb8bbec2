//! The store itself.

use crate::error::KnowledgeError;
use crate::schema::SCHEMA;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use vox_core::{EventId, GameEvent, PlayerId, Visibility, VisibilityMask};

/// One row of a timed batch write.
#[derive(Debug, Clone)]
pub struct TimedRow {
    /// Entity key (player id, city id, zone name…).
    pub entity: String,
    /// Turn the snapshot belongs to.
    pub turn: u32,
    /// Snapshot payload.
    pub payload: serde_json::Value,
    /// Who may observe the row.
    pub visibility: VisibilityMask,
}

/// One row returned from a read, already visibility-filtered.
#[derive(Debug, Clone)]
pub struct KnowledgeRow {
    /// Entity key.
    pub entity: String,
    /// Turn of the snapshot (0 for public rows).
    pub turn: u32,
    /// Snapshot payload.
    pub payload: serde_json::Value,
    /// What the requesting viewer may see of this row. The tool layer
    /// projects `Basic` rows down to their basic fields.
    pub visibility: Visibility,
}

/// Result of a mutable write.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The effective payload changed; an audit row was appended.
    Changed {
        /// The previous payload, if any.
        previous: Option<serde_json::Value>,
    },
    /// Only ignored keys (or nothing) changed; no audit row.
    Unchanged,
}

/// Filter for [`KnowledgeStore::query_events`].
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Inclusive turn range.
    pub turn_range: Option<(u32, u32)>,
    /// Exact event type.
    pub event_type: Option<String>,
    /// Maximum rows returned (newest last).
    pub limit: Option<usize>,
}

/// Async facade over the derived knowledge database.
///
/// Cloning is cheap; all clones share one connection, which is the
/// single-writer discipline the store relies on.
#[derive(Clone)]
pub struct KnowledgeStore {
    conn: Arc<Mutex<Connection>>,
}

impl KnowledgeStore {
    /// Open (or create) the store at `path` and migrate the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| KnowledgeError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, KnowledgeError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Upsert a public snapshot.
    pub async fn store_public(
        &self,
        kind: &str,
        entity: &str,
        payload: serde_json::Value,
        visibility: VisibilityMask,
    ) -> Result<(), KnowledgeError> {
        let (kind, entity) = (kind.to_string(), entity.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO public_knowledge (kind, entity, payload, visibility)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (kind, entity) DO UPDATE SET
                     payload = excluded.payload, visibility = excluded.visibility",
                params![
                    kind,
                    entity,
                    serde_json::to_string(&payload)?,
                    visibility.as_bytes()
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Read public snapshots, filtered by viewer.
    pub async fn get_public(
        &self,
        kind: &str,
        entity: Option<&str>,
        viewer: Option<PlayerId>,
    ) -> Result<Vec<KnowledgeRow>, KnowledgeError> {
        let kind = kind.to_string();
        let entity = entity.map(str::to_string);
        self.with_conn(move |conn| {
            let mut rows = Vec::new();
            let mut push = |entity: String, payload: String, vis: Vec<u8>| -> Result<(), KnowledgeError> {
                let mask = VisibilityMask::from_bytes(vis);
                let level = mask.of(viewer);
                if level != Visibility::Hidden {
                    rows.push(KnowledgeRow {
                        entity,
                        turn: 0,
                        payload: serde_json::from_str(&payload)?,
                        visibility: level,
                    });
                }
                Ok(())
            };
            match entity {
                Some(entity) => {
                    let mut stmt = conn.prepare(
                        "SELECT entity, payload, visibility FROM public_knowledge
                         WHERE kind = ?1 AND entity = ?2",
                    )?;
                    let mut result = stmt.query(params![kind, entity])?;
                    while let Some(row) = result.next()? {
                        push(row.get(0)?, row.get(1)?, row.get(2)?)?;
                    }
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT entity, payload, visibility FROM public_knowledge
                         WHERE kind = ?1 ORDER BY entity",
                    )?;
                    let mut result = stmt.query(params![kind])?;
                    while let Some(row) = result.next()? {
                        push(row.get(0)?, row.get(1)?, row.get(2)?)?;
                    }
                }
            }
            Ok(rows)
        })
        .await
    }

    /// Batch-insert per-turn snapshots. Rows already present for the
    /// same `(entity, turn)` are left untouched.
    pub async fn store_timed(
        &self,
        kind: &str,
        rows: Vec<TimedRow>,
    ) -> Result<(), KnowledgeError> {
        let kind = kind.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO timed_knowledge
                         (kind, entity, turn, payload, visibility)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for row in &rows {
                    stmt.execute(params![
                        kind,
                        row.entity,
                        row.turn,
                        serde_json::to_string(&row.payload)?,
                        row.visibility.as_bytes()
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Read per-turn snapshots in an inclusive turn range.
    pub async fn get_timed(
        &self,
        kind: &str,
        turn_range: (u32, u32),
        entity: Option<&str>,
        viewer: Option<PlayerId>,
    ) -> Result<Vec<KnowledgeRow>, KnowledgeError> {
        let kind = kind.to_string();
        let entity = entity.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT entity, turn, payload, visibility FROM timed_knowledge
                 WHERE kind = ?1 AND turn BETWEEN ?2 AND ?3
                   AND (?4 IS NULL OR entity = ?4)
                 ORDER BY turn, entity",
            )?;
            let mut result = stmt.query(params![kind, turn_range.0, turn_range.1, entity])?;
            let mut rows = Vec::new();
            while let Some(row) = result.next()? {
                let mask = VisibilityMask::from_bytes(row.get(3)?);
                let level = mask.of(viewer);
                if level == Visibility::Hidden {
                    continue;
                }
                rows.push(KnowledgeRow {
                    entity: row.get(0)?,
                    turn: row.get(1)?,
                    payload: serde_json::from_str::<serde_json::Value>(&row.get::<_, String>(2)?)?,
                    visibility: level,
                });
            }
            Ok(rows)
        })
        .await
    }

    /// Upsert the latest decision of `(kind, player)`.
    ///
    /// The candidate is compared against the current payload with
    /// `ignored` keys excluded on both sides. If the effective payloads
    /// differ, the row (including its turn) is replaced and an audit
    /// snapshot is appended to the `<kind>Changes` timed family. If they
    /// match, the stored payload is refreshed in place — ignored keys
    /// may still have changed — but the turn stays and no audit row is
    /// written.
    pub async fn store_mutable(
        &self,
        kind: &str,
        player: PlayerId,
        turn: u32,
        payload: serde_json::Value,
        visibility: Option<VisibilityMask>,
        ignored: &[String],
    ) -> Result<MutationOutcome, KnowledgeError> {
        let kind = kind.to_string();
        let ignored: HashSet<String> = ignored.iter().cloned().collect();
        let visibility =
            visibility.unwrap_or_else(|| VisibilityMask::only(player, player.index() + 1));
        self.with_conn(move |conn| {
            let current: Option<(u32, String)> = conn
                .query_row(
                    "SELECT turn, payload FROM mutable_knowledge
                     WHERE kind = ?1 AND player = ?2",
                    params![kind, player.index() as i64],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let previous: Option<serde_json::Value> = match &current {
                Some((_, text)) => Some(serde_json::from_str(text)?),
                None => None,
            };
            let changed = match &previous {
                Some(prev) => strip_keys(prev, &ignored) != strip_keys(&payload, &ignored),
                None => true,
            };

            let tx = conn.transaction()?;
            if changed {
                tx.execute(
                    "INSERT INTO mutable_knowledge (kind, player, turn, payload, visibility)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (kind, player) DO UPDATE SET
                         turn = excluded.turn,
                         payload = excluded.payload,
                         visibility = excluded.visibility",
                    params![
                        kind,
                        player.index() as i64,
                        turn,
                        serde_json::to_string(&payload)?,
                        visibility.as_bytes()
                    ],
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO timed_knowledge
                         (kind, entity, turn, payload, visibility)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        format!("{kind}Changes"),
                        player.to_string(),
                        turn,
                        serde_json::to_string(&payload)?,
                        visibility.as_bytes()
                    ],
                )?;
            } else {
                // Refresh ignored fields (rationale text and the like)
                // without counting as a mutation.
                tx.execute(
                    "UPDATE mutable_knowledge SET payload = ?3
                     WHERE kind = ?1 AND player = ?2",
                    params![kind, player.index() as i64, serde_json::to_string(&payload)?],
                )?;
            }
            tx.commit()?;

            Ok(if changed {
                MutationOutcome::Changed { previous }
            } else {
                MutationOutcome::Unchanged
            })
        })
        .await
    }

    /// Read the latest decision of `(kind, player)`.
    pub async fn get_mutable(
        &self,
        kind: &str,
        player: PlayerId,
    ) -> Result<Option<(u32, serde_json::Value)>, KnowledgeError> {
        let kind = kind.to_string();
        self.with_conn(move |conn| {
            let row: Option<(u32, String)> = conn
                .query_row(
                    "SELECT turn, payload FROM mutable_knowledge
                     WHERE kind = ?1 AND player = ?2",
                    params![kind, player.index() as i64],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some((turn, text)) => Ok(Some((turn, serde_json::from_str(&text)?))),
                None => Ok(None),
            }
        })
        .await
    }

    /// Append one event. Returns `false` when the id already exists —
    /// the existing row is never replaced, making the write idempotent.
    pub async fn store_event(&self, event: GameEvent) -> Result<bool, KnowledgeError> {
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO events (id, turn, type, payload, visibility)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.id.0,
                    event.turn,
                    event.event_type,
                    serde_json::to_string(&event.payload)?,
                    event.visibility.as_bytes()
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    /// Allocate the next derived id for `turn` and append the event in
    /// one step.
    pub async fn store_derived_event(
        &self,
        turn: u32,
        event_type: &str,
        payload: serde_json::Value,
        visibility: VisibilityMask,
    ) -> Result<EventId, KnowledgeError> {
        let event_type = event_type.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let floor = EventId::derived(turn, 0).0;
            let ceiling = EventId::native(turn + 1, 0).0;
            let max: Option<i64> = tx.query_row(
                "SELECT MAX(id) FROM events WHERE id >= ?1 AND id < ?2",
                params![floor, ceiling],
                |row| row.get(0),
            )?;
            let id = EventId(max.map_or(floor, |m| m + 1));
            tx.execute(
                "INSERT INTO events (id, turn, type, payload, visibility)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.0,
                    turn,
                    event_type,
                    serde_json::to_string(&payload)?,
                    visibility.as_bytes()
                ],
            )?;
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    /// Query the event log, filtered by viewer.
    pub async fn query_events(
        &self,
        filter: EventFilter,
        viewer: Option<PlayerId>,
    ) -> Result<Vec<GameEvent>, KnowledgeError> {
        self.with_conn(move |conn| {
            let (lo, hi) = filter
                .turn_range
                .map_or((0i64, i64::MAX), |(a, b)| {
                    (EventId::native(a, 0).0, EventId::native(b + 1, 0).0 - 1)
                });
            let mut stmt = conn.prepare(
                "SELECT id, turn, type, payload, visibility FROM events
                 WHERE id BETWEEN ?1 AND ?2 AND (?3 IS NULL OR type = ?3)
                 ORDER BY id",
            )?;
            let mut result = stmt.query(params![lo, hi, filter.event_type])?;
            let mut events = Vec::new();
            while let Some(row) = result.next()? {
                let mask = VisibilityMask::from_bytes(row.get(4)?);
                if mask.of(viewer) == Visibility::Hidden {
                    continue;
                }
                events.push(GameEvent {
                    id: EventId(row.get(0)?),
                    turn: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: serde_json::from_str::<serde_json::Value>(&row.get::<_, String>(3)?)?,
                    visibility: mask,
                });
            }
            if let Some(limit) = filter.limit {
                let skip = events.len().saturating_sub(limit);
                events.drain(..skip);
            }
            Ok(events)
        })
        .await
    }

    /// Set a static metadata value.
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<(), KnowledgeError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO metadata (key, value) VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    /// Read a static metadata value.
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, KnowledgeError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM metadata WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, KnowledgeError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, KnowledgeError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut conn)
        })
        .await
        .map_err(|e| KnowledgeError::Task(e.to_string()))?
    }
}

/// Top-level keys in `ignored` are removed before comparison.
fn strip_keys(value: &serde_json::Value, ignored: &HashSet<String>) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(k, _)| !ignored.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn public_upsert_replaces() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store
            .store_public("GameInfo", "settings", json!({"speed": "Standard"}),
                VisibilityMask::all_full(4))
            .await
            .unwrap();
        store
            .store_public("GameInfo", "settings", json!({"speed": "Epic"}),
                VisibilityMask::all_full(4))
            .await
            .unwrap();
        let rows = store.get_public("GameInfo", Some("settings"), None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload["speed"], "Epic");
    }

    #[tokio::test]
    async fn timed_first_write_wins_within_turn() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let row = |gold: i64| TimedRow {
            entity: "0".into(),
            turn: 12,
            payload: json!({"gold": gold}),
            visibility: VisibilityMask::all_full(2),
        };
        store.store_timed("PlayerReport", vec![row(100)]).await.unwrap();
        store.store_timed("PlayerReport", vec![row(999)]).await.unwrap();
        let rows = store
            .get_timed("PlayerReport", (12, 12), None, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload["gold"], 100);
    }

    #[tokio::test]
    async fn hidden_rows_are_filtered() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store
            .store_timed(
                "Opinions",
                vec![TimedRow {
                    entity: "3".into(),
                    turn: 5,
                    payload: json!({"toward": 0}),
                    visibility: VisibilityMask::only(PlayerId(3), 4),
                }],
            )
            .await
            .unwrap();
        let as_owner = store
            .get_timed("Opinions", (5, 5), None, Some(PlayerId(3)))
            .await
            .unwrap();
        assert_eq!(as_owner.len(), 1);
        let as_rival = store
            .get_timed("Opinions", (5, 5), None, Some(PlayerId(1)))
            .await
            .unwrap();
        assert!(as_rival.is_empty());
        let omniscient = store.get_timed("Opinions", (5, 5), None, None).await.unwrap();
        assert_eq!(omniscient.len(), 1);
    }

    #[tokio::test]
    async fn mutable_change_appends_audit_row() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let outcome = store
            .store_mutable(
                "Strategy",
                PlayerId(0),
                10,
                json!({"Strategies": ["Conquest"], "Rationale": "war footing"}),
                None,
                &["Rationale".into()],
            )
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::Changed { previous: None });

        let audits = store
            .get_timed("StrategyChanges", (0, 100), None, None)
            .await
            .unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].payload["Rationale"], "war footing");
    }

    #[tokio::test]
    async fn mutable_ignored_only_change_is_not_a_mutation() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let ignored = vec!["Rationale".to_string()];
        store
            .store_mutable(
                "Strategy",
                PlayerId(1),
                10,
                json!({"Strategies": ["Culture"], "Rationale": "tourism lead"}),
                None,
                &ignored,
            )
            .await
            .unwrap();
        let outcome = store
            .store_mutable(
                "Strategy",
                PlayerId(1),
                11,
                json!({"Strategies": ["Culture"], "Rationale": "still ahead"}),
                None,
                &ignored,
            )
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::Unchanged);

        // Exactly one audit row, and the stored turn did not move.
        let audits = store
            .get_timed("StrategyChanges", (0, 100), None, None)
            .await
            .unwrap();
        assert_eq!(audits.len(), 1);
        let (turn, payload) = store.get_mutable("Strategy", PlayerId(1)).await.unwrap().unwrap();
        assert_eq!(turn, 10);
        // Rationale still refreshed in place.
        assert_eq!(payload["Rationale"], "still ahead");
    }

    #[tokio::test]
    async fn event_ids_are_idempotent() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let event = GameEvent {
            id: EventId::native(7, 3),
            turn: 7,
            event_type: "WarDeclared".into(),
            payload: json!({"aggressor": 2}),
            visibility: VisibilityMask::all_full(4),
        };
        assert!(store.store_event(event.clone()).await.unwrap());
        assert!(!store.store_event(event).await.unwrap());
        let events = store.query_events(EventFilter::default(), None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.turn(), 7);
    }

    #[tokio::test]
    async fn derived_ids_allocate_in_high_range() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let first = store
            .store_derived_event(9, "BriefingReady", json!({}), VisibilityMask::all_full(2))
            .await
            .unwrap();
        let second = store
            .store_derived_event(9, "BriefingReady", json!({}), VisibilityMask::all_full(2))
            .await
            .unwrap();
        assert!(first.is_derived());
        assert_eq!(second.0, first.0 + 1);
        assert_eq!(first.turn(), 9);
    }

    #[tokio::test]
    async fn query_events_filters_by_turn_and_type() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        for (turn, slot, ty) in [(1, 0, "A"), (1, 1, "B"), (2, 0, "A"), (3, 0, "A")] {
            store
                .store_event(GameEvent {
                    id: EventId::native(turn, slot),
                    turn,
                    event_type: ty.into(),
                    payload: json!({}),
                    visibility: VisibilityMask::all_full(2),
                })
                .await
                .unwrap();
        }
        let events = store
            .query_events(
                EventFilter {
                    turn_range: Some((1, 2)),
                    event_type: Some("A".into()),
                    limit: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == "A"));
    }

    #[tokio::test]
    async fn metadata_roundtrip() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store.set_meta("difficulty", "Immortal").await.unwrap();
        store.set_meta("difficulty", "Deity").await.unwrap();
        assert_eq!(store.get_meta("difficulty").await.unwrap().unwrap(), "Deity");
        assert!(store.get_meta("absent").await.unwrap().is_none());
    }
}
