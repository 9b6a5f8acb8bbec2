//! Enum catalogs: integer ID ↔ canonical name per rules concept.
//!
//! Built once at startup by scanning a fixed list of rules tables. The
//! canonical name prefers a row's localized `Description`; rows without
//! one derive a name from `Type` (`UNIT_GREAT_GENERAL` → "Great
//! General"). Every catalog maps `-1` to `None`.

use crate::error::GatewayError;
use crate::gateway::DbGateway;
use crate::localize::is_text_key;
use std::collections::{BTreeSet, HashMap};

/// The scanned tables: `(concept, rules table, display prefix)`.
pub const ENUM_TABLES: &[(&str, &str, Option<&str>)] = &[
    ("UnitType", "Units", None),
    ("BuildingType", "Buildings", None),
    ("TechType", "Technologies", None),
    ("PolicyType", "Policies", None),
    ("PolicyBranchType", "PolicyBranchTypes", None),
    ("ResourceType", "Resources", None),
    ("ImprovementType", "Improvements", None),
    ("CivilizationType", "Civilizations", None),
    ("LeaderType", "Leaders", None),
    ("BeliefType", "Beliefs", None),
    ("VictoryType", "Victories", None),
    ("EraType", "Eras", None),
    ("PromotionType", "UnitPromotions", None),
    ("GreatPersonType", "GreatPersons", Some("Great ")),
];

/// One concept's ID ↔ name tables.
#[derive(Debug, Default, Clone)]
struct ConceptCatalog {
    by_id: HashMap<i64, String>,
    by_name: HashMap<String, i64>,
}

/// All enum catalogs, immutable after construction.
#[derive(Debug, Clone)]
pub struct EnumCatalog {
    concepts: HashMap<String, ConceptCatalog>,
}

impl EnumCatalog {
    /// Scan the rules database and build every catalog.
    ///
    /// Missing tables are logged and skipped (mods can remove whole
    /// concepts); a missing `Description` column falls back to `Type`
    /// derivation for the entire table.
    pub async fn build(gateway: &DbGateway) -> Result<Self, GatewayError> {
        let mut concepts = HashMap::new();
        for &(concept, table, display_prefix) in ENUM_TABLES {
            match scan_table(gateway, table, display_prefix).await {
                Ok(catalog) => {
                    concepts.insert(concept.to_string(), catalog);
                }
                Err(e) => {
                    tracing::warn!(concept, table, error = %e, "skipping enum table");
                }
            }
        }
        Ok(Self { concepts })
    }

    /// The canonical name for an ID, or `None` if the concept or ID is
    /// unknown. `-1` always resolves to the string `"None"`.
    pub fn name_of(&self, concept: &str, id: i64) -> Option<&str> {
        self.concepts
            .get(concept)
            .and_then(|c| c.by_id.get(&id))
            .map(String::as_str)
    }

    /// Reverse lookup, case-insensitive on the name.
    pub fn id_of(&self, concept: &str, name: &str) -> Option<i64> {
        self.concepts
            .get(concept)
            .and_then(|c| c.by_name.get(&name.to_ascii_lowercase()))
            .copied()
    }

    /// The concepts that were actually built.
    pub fn concepts(&self) -> impl Iterator<Item = &str> {
        self.concepts.keys().map(String::as_str)
    }
}

async fn scan_table(
    gateway: &DbGateway,
    table: &str,
    display_prefix: Option<&str>,
) -> Result<ConceptCatalog, GatewayError> {
    let rows = match gateway
        .query(format!("SELECT ID, Type, Description FROM {table}"), vec![])
        .await
    {
        Ok(rows) => rows,
        // Some tables have no Description column at all.
        Err(_) => {
            gateway
                .query(format!("SELECT ID, Type FROM {table}"), vec![])
                .await?
        }
    };

    // Batch the description keys so each table costs one localization
    // query.
    let mut keys = BTreeSet::new();
    for row in &rows {
        if let Some(desc) = row.get("Description").and_then(|d| d.as_str()) {
            if is_text_key(desc) {
                keys.insert(desc.to_string());
            }
        }
    }
    let resolved = gateway.localize_batch(keys).await?;

    let mut catalog = ConceptCatalog::default();
    insert(&mut catalog, -1, "None".to_string());
    for row in &rows {
        let Some(id) = row.get("ID").and_then(|v| v.as_i64()) else {
            continue;
        };
        let described = row
            .get("Description")
            .and_then(|d| d.as_str())
            .and_then(|d| resolved.get(d).cloned());
        let name = match described {
            Some(text) => text,
            None => match row.get("Type").and_then(|t| t.as_str()) {
                Some(ty) => derive_name(ty),
                None => continue,
            },
        };
        let name = match display_prefix {
            Some(prefix) if !name.starts_with(prefix) => format!("{prefix}{name}"),
            _ => name,
        };
        insert(&mut catalog, id, name);
    }
    Ok(catalog)
}

fn insert(catalog: &mut ConceptCatalog, id: i64, name: String) {
    catalog.by_name.insert(name.to_ascii_lowercase(), id);
    catalog.by_id.insert(id, name);
}

/// Derive a display name from a `Type` constant: strip everything up to
/// and including the first underscore, then title-case the words.
fn derive_name(type_name: &str) -> String {
    let rest = match type_name.split_once('_') {
        Some((_, rest)) => rest,
        None => type_name,
    };
    rest.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
