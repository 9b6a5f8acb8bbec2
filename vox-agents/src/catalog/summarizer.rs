//! Stateless summarizer with a content-addressed cache.

use crate::agent::{Agent, AgentError, SharedParams, Step};
use crate::runtime::RuntimeHandle;
use async_trait::async_trait;
use vox_core::PlayerParams;
use vox_llm::{ModelTier, ProviderMessage, StopReason};
use vox_telemetry::{TelepathistStore, summary_cache_key};

/// `{Text, Instruction} → summary`, cached by SHA-256 over both.
pub struct Summarizer {
    cache: Option<TelepathistStore>,
}

impl Summarizer {
    /// Build a summarizer; without a store it still works, just
    /// uncached.
    pub fn new(cache: Option<TelepathistStore>) -> Self {
        Self { cache }
    }

    fn key_of(input: &serde_json::Value) -> Option<String> {
        let text = input.get("Text")?.as_str()?;
        let instruction = input.get("Instruction")?.as_str()?;
        Some(summary_cache_key(instruction, text))
    }
}

#[async_trait]
impl Agent for Summarizer {
    fn name(&self) -> &str {
        "summarizer"
    }

    fn description(&self) -> &str {
        "Summarize a text according to an instruction"
    }

    fn tags(&self) -> &[&str] {
        &["utility"]
    }

    fn tier(&self) -> ModelTier {
        ModelTier::Fast
    }

    fn system_prompt(&self, _params: &PlayerParams) -> String {
        "Summarize the given text exactly as instructed. Output only the \
         summary."
            .to_string()
    }

    fn active_tools(&self) -> Vec<String> {
        vec![]
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "Text": {"type": "string"},
                "Instruction": {"type": "string"}
            },
            "required": ["Text", "Instruction"],
            "additionalProperties": false
        })
    }

    async fn check_cache(&self, input: &serde_json::Value) -> Option<String> {
        let store = self.cache.as_ref()?;
        let key = Self::key_of(input)?;
        match store.cache_get(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, "summary cache read failed");
                None
            }
        }
    }

    async fn initial_messages(
        &self,
        _runtime: &RuntimeHandle,
        _params: &SharedParams,
        input: &serde_json::Value,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Vec<ProviderMessage>, AgentError> {
        let text = input.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let instruction = input
            .get("Instruction")
            .and_then(|v| v.as_str())
            .unwrap_or("Summarize the text.");
        Ok(vec![ProviderMessage::user(format!(
            "{instruction}\n\n---\n{text}"
        ))])
    }

    fn stop_check(&self, last: &Step, _steps: &[Step]) -> bool {
        last.response.stop_reason == StopReason::EndTurn && !last.response.text().is_empty()
    }

    async fn on_complete(&self, input: &serde_json::Value, output: &str) {
        let Some(store) = &self.cache else { return };
        let Some(key) = Self::key_of(input) else {
            return;
        };
        if let Err(e) = store.cache_put(&key, output, "summarizer").await {
            tracing::warn!(error = %e, "summary cache write failed");
        }
    }
}
