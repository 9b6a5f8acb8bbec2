//! Schema migration, applied idempotently at open.

/// The full schema. `IF NOT EXISTS` everywhere keeps reopening cheap.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS public_knowledge (
    kind       TEXT NOT NULL,
    entity     TEXT NOT NULL,
    payload    TEXT NOT NULL,
    visibility BLOB NOT NULL,
    PRIMARY KEY (kind, entity)
);

CREATE TABLE IF NOT EXISTS timed_knowledge (
    kind       TEXT NOT NULL,
    entity     TEXT NOT NULL,
    turn       INTEGER NOT NULL,
    payload    TEXT NOT NULL,
    visibility BLOB NOT NULL,
    PRIMARY KEY (kind, entity, turn)
);
CREATE INDEX IF NOT EXISTS idx_timed_kind_turn ON timed_knowledge (kind, turn);

CREATE TABLE IF NOT EXISTS mutable_knowledge (
    kind       TEXT NOT NULL,
    player     INTEGER NOT NULL,
    turn       INTEGER NOT NULL,
    payload    TEXT NOT NULL,
    visibility BLOB NOT NULL,
    PRIMARY KEY (kind, player)
);

CREATE TABLE IF NOT EXISTS events (
    id         INTEGER PRIMARY KEY,
    turn       INTEGER NOT NULL,
    type       TEXT NOT NULL,
    payload    TEXT NOT NULL,
    visibility BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_turn ON events (turn);
CREATE INDEX IF NOT EXISTS idx_events_type ON events (type);

CREATE TABLE IF NOT EXISTS metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";
