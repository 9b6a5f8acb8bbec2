//! Input validation at the tool boundary.

use vox_core::ToolError;

/// A compiled JSON Schema, validated once at tool construction.
///
/// Schemas are part of a tool's external contract: the same schema is
/// served to RPC clients, sent to the model as the tool definition, and
/// enforced here before execution.
pub struct SchemaValidator {
    schema: serde_json::Value,
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile a schema. Panics on an invalid schema — tool schemas are
    /// authored constants and a bad one is a programming error caught
    /// at startup.
    pub fn new(schema: serde_json::Value) -> Self {
        let validator = jsonschema::validator_for(&schema)
            .unwrap_or_else(|e| panic!("invalid tool schema: {e}"));
        Self { schema, validator }
    }

    /// The schema as served to clients and models.
    pub fn schema(&self) -> &serde_json::Value {
        &self.schema
    }

    /// Validate an instance, collecting every violation.
    pub fn validate(&self, instance: &serde_json::Value) -> Result<(), ToolError> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArgument(errors.join("; ")))
        }
    }
}
