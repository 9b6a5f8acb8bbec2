//! Database-query tools: cached summary lists with tiered search and
//! full-record drill-down.

use crate::search::rank;
use crate::validate::SchemaValidator;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;
use vox_core::{ToolAnnotations, ToolContext, ToolDyn, ToolError, ToolFuture};

/// Loader producing the summary list. Ran at most once per process —
/// the rules database is immutable while the game runs.
pub type SummaryLoader = Arc<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<Vec<serde_json::Value>, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// Loader producing the full record for one `ID`.
pub type FullLoader = Arc<
    dyn Fn(i64) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send>>
        + Send
        + Sync,
>;

const DEFAULT_MAX_RESULTS: usize = 25;

#[derive(Debug, Deserialize)]
struct QueryInput {
    #[serde(rename = "Search")]
    search: Option<String>,
    #[serde(rename = "MaxResults")]
    max_results: Option<usize>,
}

/// A read tool over one rules concept.
///
/// `execute({Search?, MaxResults?})` returns `{count, items}`; when the
/// search narrows to exactly one summary, `items` holds that entity's
/// full record instead of its summary.
pub struct DatabaseQueryTool {
    name: String,
    description: String,
    validator: SchemaValidator,
    summaries: OnceCell<Vec<serde_json::Value>>,
    load_summaries: SummaryLoader,
    load_full: FullLoader,
}

impl DatabaseQueryTool {
    /// Build a query tool.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        load_summaries: SummaryLoader,
        load_full: FullLoader,
    ) -> Self {
        let validator = SchemaValidator::new(serde_json::json!({
            "type": "object",
            "properties": {
                "Search": {
                    "type": "string",
                    "description": "Type constant, display name, or fuzzy fragment"
                },
                "MaxResults": {
                    "type": "integer", "minimum": 1,
                    "description": "Cap on returned summaries (default 25)"
                }
            },
            "additionalProperties": false
        }));
        Self {
            name: name.into(),
            description: description.into(),
            validator,
            summaries: OnceCell::new(),
            load_summaries,
            load_full,
        }
    }

    async fn cached_summaries(&self) -> Result<&Vec<serde_json::Value>, ToolError> {
        self.summaries
            .get_or_try_init(|| (self.load_summaries)())
            .await
    }

    async fn run(&self, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        self.validator.validate(&input)?;
        let input: QueryInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArgument(e.to_string()))?;
        let max = input.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

        let summaries = self.cached_summaries().await?;
        let selected = match &input.search {
            Some(query) => rank(summaries, query, max),
            None => summaries.iter().take(max).cloned().collect(),
        };

        if selected.len() == 1 {
            if let Some(id) = selected[0].get("ID").and_then(|v| v.as_i64()) {
                let full = (self.load_full)(id).await?;
                return Ok(serde_json::json!({"count": 1, "items": [full]}));
            }
        }
        Ok(serde_json::json!({"count": selected.len(), "items": selected}))
    }
}

impl ToolDyn for DatabaseQueryTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.validator.schema().clone()
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer"},
                "items": {"type": "array"}
            },
            "required": ["count", "items"]
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
        Box::pin(self.run(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tool(load_count: Arc<AtomicUsize>) -> DatabaseQueryTool {
        let summaries: SummaryLoader = Arc::new(move || {
            let count = Arc::clone(&load_count);
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(vec![
                    json!({"ID": 0, "Type": "TECH_AGRICULTURE", "Name": "Agriculture"}),
                    json!({"ID": 1, "Type": "TECH_POTTERY", "Name": "Pottery"}),
                    json!({"ID": 2, "Type": "TECH_MINING", "Name": "Mining"}),
                ])
            })
        });
        let full: FullLoader = Arc::new(|id| {
            Box::pin(async move {
                Ok(json!({"ID": id, "Type": "TECH_AGRICULTURE", "Name": "Agriculture",
                          "PrereqTechs": [], "Cost": 20}))
            })
        });
        DatabaseQueryTool::new("get_technology", "Look up technologies", summaries, full)
    }

    #[tokio::test]
    async fn single_match_returns_full_record() {
        let tool = tool(Arc::new(AtomicUsize::new(0)));
        let out = tool
            .call(ToolContext::default(), json!({"Search": "TECH_AGRICULTURE"}))
            .await
            .unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["items"][0]["Cost"], 20);
    }

    #[tokio::test]
    async fn multi_match_returns_summaries() {
        let tool = tool(Arc::new(AtomicUsize::new(0)));
        // Empty search: all summaries.
        let out = tool.call(ToolContext::default(), json!({})).await.unwrap();
        assert_eq!(out["count"], 3);
        assert!(out["items"][0].get("Cost").is_none());
    }

    #[tokio::test]
    async fn summaries_load_once_per_process() {
        let count = Arc::new(AtomicUsize::new(0));
        let tool = tool(Arc::clone(&count));
        for _ in 0..5 {
            tool.call(ToolContext::default(), json!({})).await.unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn max_results_is_honored() {
        let tool = tool(Arc::new(AtomicUsize::new(0)));
        let out = tool
            .call(ToolContext::default(), json!({"MaxResults": 2}))
            .await
            .unwrap();
        assert_eq!(out["count"], 2);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let tool = tool(Arc::new(AtomicUsize::new(0)));
        let err = tool
            .call(ToolContext::default(), json!({"Search": 9}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
    }
}
