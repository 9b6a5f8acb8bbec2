//! The derived knowledge store.
//!
//! A single SQLite database holding what the decision layer has learned
//! from the game, in four table families:
//!
//! | Family | Keyed by | Semantics |
//! |--------|----------|-----------|
//! | public | `(kind, entity)` | upsert, latest snapshot per entity |
//! | timed | `(kind, entity, turn)` | per-turn snapshots, first write wins |
//! | mutable | `(kind, player)` | latest decision per player, audited on change |
//! | events | packed id | append-only game event log |
//!
//! Every row carries a [`VisibilityMask`](vox_core::VisibilityMask);
//! reads take a viewer and never return rows the viewer may not see.
//! Writes are serialized through one connection — the single-writer
//! discipline that keeps SQLite happy under concurrent turn pipelines.

#![deny(missing_docs)]

mod error;
mod schema;
mod store;

pub use error::KnowledgeError;
pub use store::{EventFilter, KnowledgeRow, KnowledgeStore, MutationOutcome, TimedRow};
