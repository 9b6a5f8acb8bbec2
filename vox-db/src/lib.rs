//! Gateway to the two read-only game databases.
//!
//! The game writes a rules database (units, buildings, technologies,
//! policies, …) and a localization database (`TXT_KEY_*` → language text)
//! to disk; this crate opens both read-only and exposes typed queries,
//! batched localization, and the enum catalog (integer ID ↔ canonical
//! name per rules concept).
//!
//! Connections live behind async facades: rusqlite is synchronous, so
//! every query hops onto the blocking pool. The databases are immutable
//! while the game runs, which is what makes process-lifetime caching of
//! summaries and catalogs sound.

#![deny(missing_docs)]

mod enums;
mod error;
mod gateway;
mod localize;

pub use enums::{EnumCatalog, ENUM_TABLES};
pub use error::GatewayError;
pub use gateway::DbGateway;
pub use localize::{collect_text_keys, is_text_key, substitute_text_keys};
