//! Concrete read tools over the rules database.
//!
//! One [`DatabaseQueryTool`] per concept. Summaries carry `{ID, Type,
//! Name}` (names localized in one batch per table); full records are
//! the entire row, deep-localized, plus per-concept enrichments — a
//! technology's full record includes everything it unlocks.

use crate::query::{DatabaseQueryTool, FullLoader, SummaryLoader};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use vox_core::{ToolError, ToolRegistry};
use vox_db::{DbGateway, is_text_key};

/// Register every rules-database read tool.
pub fn register_query_tools(registry: &mut ToolRegistry, gateway: &DbGateway) {
    registry.register(Arc::new(technology_tool(gateway.clone())));
    registry.register(Arc::new(unit_tool(gateway.clone())));
    registry.register(Arc::new(building_tool(gateway.clone())));
    registry.register(Arc::new(policy_tool(gateway.clone())));
    registry.register(Arc::new(resource_tool(gateway.clone())));
    registry.register(Arc::new(civilization_tool(gateway.clone())));
}

fn dep(e: impl std::fmt::Display) -> ToolError {
    ToolError::DependencyFailed(e.to_string())
}

/// Standard `{ID, Type, Name}` summary loader for one table.
fn summaries_for(gateway: DbGateway, table: &'static str) -> SummaryLoader {
    Arc::new(move || {
        let gateway = gateway.clone();
        Box::pin(async move {
            let rows = gateway
                .query(
                    format!("SELECT ID, Type, Description FROM {table} ORDER BY ID"),
                    vec![],
                )
                .await
                .map_err(dep)?;

            let mut keys = BTreeSet::new();
            for row in &rows {
                if let Some(desc) = row.get("Description").and_then(|d| d.as_str()) {
                    if is_text_key(desc) {
                        keys.insert(desc.to_string());
                    }
                }
            }
            let resolved = gateway.localize_batch(keys).await.map_err(dep)?;

            Ok(rows
                .into_iter()
                .map(|row| {
                    let type_name = row.get("Type").and_then(|t| t.as_str()).unwrap_or("");
                    let name = row
                        .get("Description")
                        .and_then(|d| d.as_str())
                        .and_then(|d| resolved.get(d).cloned())
                        .unwrap_or_else(|| type_name.to_string());
                    json!({"ID": row.get("ID").cloned().unwrap_or(json!(null)),
                           "Type": type_name,
                           "Name": name})
                })
                .collect())
        })
    })
}

/// Full-record loader: the whole row, deep-localized.
fn full_row(gateway: DbGateway, table: &'static str) -> FullLoader {
    Arc::new(move |id| {
        let gateway = gateway.clone();
        Box::pin(async move {
            let rows = gateway
                .query(
                    format!("SELECT * FROM {table} WHERE ID = ?1"),
                    vec![json!(id)],
                )
                .await
                .map_err(dep)?;
            let row = rows
                .into_iter()
                .next()
                .ok_or_else(|| ToolError::NotFound(format!("{table} id {id}")))?;
            Ok(gateway.localize_recursive(&row).await)
        })
    })
}

fn string_column(rows: Vec<serde_json::Value>, column: &str) -> Vec<serde_json::Value> {
    rows.into_iter()
        .filter_map(|row| row.get(column).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn technology_tool(gateway: DbGateway) -> DatabaseQueryTool {
    let full_gateway = gateway.clone();
    let full: FullLoader = Arc::new(move |id| {
        let gateway = full_gateway.clone();
        Box::pin(async move {
            let rows = gateway
                .query("SELECT * FROM Technologies WHERE ID = ?1", vec![json!(id)])
                .await
                .map_err(dep)?;
            let mut record = rows
                .into_iter()
                .next()
                .ok_or_else(|| ToolError::NotFound(format!("technology id {id}")))?;

            let tech_type = record
                .get("Type")
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .to_string();

            let prereqs = gateway
                .query(
                    "SELECT PrereqTech FROM Technology_PrereqTechs WHERE TechType = ?1",
                    vec![json!(tech_type)],
                )
                .await
                .map_err(dep)?;
            let units = gateway
                .query(
                    "SELECT Type FROM Units WHERE PrereqTech = ?1 ORDER BY ID",
                    vec![json!(tech_type)],
                )
                .await
                .map_err(dep)?;
            let buildings = gateway
                .query(
                    "SELECT b.Type AS Type FROM Buildings b
                     JOIN BuildingClasses c ON b.BuildingClass = c.Type
                     WHERE b.PrereqTech = ?1
                       AND COALESCE(c.MaxGlobalInstances, -1) <= 0
                       AND COALESCE(c.MaxPlayerInstances, -1) <> 1
                     ORDER BY b.ID",
                    vec![json!(tech_type)],
                )
                .await
                .map_err(dep)?;
            let world_wonders = gateway
                .query(
                    "SELECT b.Type AS Type FROM Buildings b
                     JOIN BuildingClasses c ON b.BuildingClass = c.Type
                     WHERE b.PrereqTech = ?1 AND c.MaxGlobalInstances = 1
                     ORDER BY b.ID",
                    vec![json!(tech_type)],
                )
                .await
                .map_err(dep)?;
            let national_wonders = gateway
                .query(
                    "SELECT b.Type AS Type FROM Buildings b
                     JOIN BuildingClasses c ON b.BuildingClass = c.Type
                     WHERE b.PrereqTech = ?1 AND c.MaxPlayerInstances = 1
                     ORDER BY b.ID",
                    vec![json!(tech_type)],
                )
                .await
                .map_err(dep)?;
            let improvements = gateway
                .query(
                    "SELECT ImprovementType FROM Builds
                     WHERE PrereqTech = ?1 AND ImprovementType IS NOT NULL",
                    vec![json!(tech_type)],
                )
                .await
                .map_err(dep)?;

            if let Some(map) = record.as_object_mut() {
                map.insert(
                    "PrereqTechs".into(),
                    json!(string_column(prereqs, "PrereqTech")),
                );
                map.insert("UnitsUnlocked".into(), json!(string_column(units, "Type")));
                map.insert(
                    "BuildingsUnlocked".into(),
                    json!(string_column(buildings, "Type")),
                );
                map.insert(
                    "WorldWondersUnlocked".into(),
                    json!(string_column(world_wonders, "Type")),
                );
                map.insert(
                    "NationalWondersUnlocked".into(),
                    json!(string_column(national_wonders, "Type")),
                );
                map.insert(
                    "ImprovementsUnlocked".into(),
                    json!(string_column(improvements, "ImprovementType")),
                );
            }
            Ok(gateway.localize_recursive(&record).await)
        })
    });

    DatabaseQueryTool::new(
        "get_technology",
        "Look up technologies: prerequisites and everything they unlock",
        summaries_for(gateway, "Technologies"),
        full,
    )
}

fn unit_tool(gateway: DbGateway) -> DatabaseQueryTool {
    DatabaseQueryTool::new(
        "get_unit",
        "Look up units: combat strength, cost, prerequisites",
        summaries_for(gateway.clone(), "Units"),
        full_row(gateway, "Units"),
    )
}

fn building_tool(gateway: DbGateway) -> DatabaseQueryTool {
    DatabaseQueryTool::new(
        "get_building",
        "Look up buildings and wonders: yields, cost, prerequisites",
        summaries_for(gateway.clone(), "Buildings"),
        full_row(gateway, "Buildings"),
    )
}

fn policy_tool(gateway: DbGateway) -> DatabaseQueryTool {
    DatabaseQueryTool::new(
        "get_policy",
        "Look up social policies and their effects",
        summaries_for(gateway.clone(), "Policies"),
        full_row(gateway, "Policies"),
    )
}

fn resource_tool(gateway: DbGateway) -> DatabaseQueryTool {
    DatabaseQueryTool::new(
        "get_resource",
        "Look up resources: yields, improvements, units they enable",
        summaries_for(gateway.clone(), "Resources"),
        full_row(gateway, "Resources"),
    )
}

fn civilization_tool(gateway: DbGateway) -> DatabaseQueryTool {
    DatabaseQueryTool::new(
        "get_civilization",
        "Look up civilizations, their leaders and unique traits",
        summaries_for(gateway.clone(), "Civilizations"),
        full_row(gateway, "Civilizations"),
    )
}
