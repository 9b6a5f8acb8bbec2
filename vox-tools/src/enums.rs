//! Enum resolution as a tool: integer ID ↔ canonical name.

use crate::validate::SchemaValidator;
use std::sync::Arc;
use vox_core::{ToolAnnotations, ToolContext, ToolDyn, ToolError, ToolFuture};
use vox_db::EnumCatalog;

/// Resolves rules-database enums through the startup-built catalog.
///
/// Give it an `ID` to get the canonical name, or a `Name` to get the
/// ID. Pure in-memory lookup; never suspends.
pub struct EnumResolveTool {
    catalog: Arc<EnumCatalog>,
    validator: SchemaValidator,
}

impl EnumResolveTool {
    /// Build the tool over a finished catalog.
    pub fn new(catalog: Arc<EnumCatalog>) -> Self {
        let validator = SchemaValidator::new(serde_json::json!({
            "type": "object",
            "properties": {
                "Concept": {
                    "type": "string",
                    "description": "Catalog name, e.g. UnitType, TechType, PolicyType"
                },
                "ID": {"type": "integer"},
                "Name": {"type": "string"}
            },
            "required": ["Concept"],
            "additionalProperties": false
        }));
        Self { catalog, validator }
    }

    fn resolve(&self, input: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        self.validator.validate(input)?;
        let concept = input["Concept"].as_str().unwrap_or("");
        if let Some(id) = input.get("ID").and_then(|v| v.as_i64()) {
            let name = self
                .catalog
                .name_of(concept, id)
                .ok_or_else(|| ToolError::NotFound(format!("{concept} id {id}")))?;
            return Ok(serde_json::json!({"Concept": concept, "ID": id, "Name": name}));
        }
        if let Some(name) = input.get("Name").and_then(|v| v.as_str()) {
            let id = self
                .catalog
                .id_of(concept, name)
                .ok_or_else(|| ToolError::NotFound(format!("{concept} name {name:?}")))?;
            return Ok(serde_json::json!({"Concept": concept, "ID": id, "Name": name}));
        }
        Err(ToolError::InvalidArgument(
            "provide either ID or Name".into(),
        ))
    }
}

impl ToolDyn for EnumResolveTool {
    fn name(&self) -> &str {
        "resolve_enum"
    }

    fn description(&self) -> &str {
        "Resolve a rules enum between its integer ID and canonical name"
    }

    fn input_schema(&self) -> serde_json::Value {
        self.validator.schema().clone()
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "Concept": {"type": "string"},
                "ID": {"type": "integer"},
                "Name": {"type": "string"}
            },
            "required": ["Concept", "ID", "Name"]
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations {
            read_only: true,
            auto_complete: true,
            markdown: None,
        }
    }

    fn call(&self, _ctx: ToolContext, input: serde_json::Value) -> ToolFuture<'_> {
        let result = self.resolve(&input);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use vox_db::DbGateway;

    async fn catalog() -> (tempfile::TempDir, Arc<EnumCatalog>) {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.db");
        let loc = dir.path().join("loc.db");
        let conn = Connection::open(&rules).unwrap();
        conn.execute_batch(
            "CREATE TABLE Units (ID INTEGER, Type TEXT, Description TEXT);
             INSERT INTO Units VALUES (0, 'UNIT_WARRIOR', NULL), (1, 'UNIT_ARCHER', NULL);",
        )
        .unwrap();
        drop(conn);
        let conn = Connection::open(&loc).unwrap();
        conn.execute_batch("CREATE TABLE Language_en_US (Tag TEXT, Text TEXT);")
            .unwrap();
        drop(conn);
        let gateway = DbGateway::open(&rules, &loc, "en_US").unwrap();
        let catalog = EnumCatalog::build(&gateway).await.unwrap();
        (dir, Arc::new(catalog))
    }

    #[tokio::test]
    async fn resolves_both_directions() {
        let (_dir, catalog) = catalog().await;
        let tool = EnumResolveTool::new(catalog);

        let by_id = tool
            .call(
                ToolContext::default(),
                serde_json::json!({"Concept": "UnitType", "ID": 1}),
            )
            .await
            .unwrap();
        assert_eq!(by_id["Name"], "Archer");

        let by_name = tool
            .call(
                ToolContext::default(),
                serde_json::json!({"Concept": "UnitType", "Name": "warrior"}),
            )
            .await
            .unwrap();
        assert_eq!(by_name["ID"], 0);

        let none = tool
            .call(
                ToolContext::default(),
                serde_json::json!({"Concept": "UnitType", "ID": -1}),
            )
            .await
            .unwrap();
        assert_eq!(none["Name"], "None");
    }

    #[tokio::test]
    async fn unknown_lookups_are_not_found() {
        let (_dir, catalog) = catalog().await;
        let tool = EnumResolveTool::new(catalog);
        let err = tool
            .call(
                ToolContext::default(),
                serde_json::json!({"Concept": "UnitType", "ID": 99}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
