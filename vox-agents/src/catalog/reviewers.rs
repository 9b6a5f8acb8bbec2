//! Review agents over a prior session's telemetry: the envoy answers
//! questions about what happened, the telepathist reflects on how the
//! decisions were made. Both read the turn and phase summaries a setup
//! pass generated offline; neither runs in the live turn loop.

use crate::agent::{Agent, AgentError, SharedParams, Step};
use crate::runtime::RuntimeHandle;
use async_trait::async_trait;
use vox_core::PlayerParams;
use vox_llm::{ProviderMessage, StopReason};
use vox_telemetry::TelepathistStore;

async fn summaries_context(store: &TelepathistStore) -> Result<String, AgentError> {
    let phases = store
        .phase_summaries()
        .await
        .map_err(|e| AgentError::Runtime(e.to_string()))?;
    let turns = store
        .turn_summaries()
        .await
        .map_err(|e| AgentError::Runtime(e.to_string()))?;

    let mut text = String::from("Phases of the game:\n");
    for phase in phases {
        text.push_str(&format!(
            "- Turns {}-{}: {}\n",
            phase.from_turn, phase.to_turn, phase.summary
        ));
    }
    text.push_str("\nTurn-by-turn:\n");
    for turn in turns {
        text.push_str(&format!("- Turn {}: {}\n", turn.turn, turn.short_summary));
    }
    Ok(text)
}

/// Answers factual questions about one recorded game.
pub struct Envoy {
    store: TelepathistStore,
}

impl Envoy {
    /// Build the envoy over a session's sidecar store.
    pub fn new(store: TelepathistStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Agent for Envoy {
    fn name(&self) -> &str {
        "envoy"
    }

    fn description(&self) -> &str {
        "Answers questions about a recorded game session"
    }

    fn tags(&self) -> &[&str] {
        &["review"]
    }

    fn system_prompt(&self, _params: &PlayerParams) -> String {
        "You answer questions about one recorded game of a 4X strategy \
         title, using only the session summaries provided. Cite turns when \
         you can. Say so plainly when the record does not answer the \
         question."
            .to_string()
    }

    fn active_tools(&self) -> Vec<String> {
        vec![]
    }

    async fn initial_messages(
        &self,
        _runtime: &RuntimeHandle,
        _params: &SharedParams,
        input: &serde_json::Value,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Vec<ProviderMessage>, AgentError> {
        let question = input
            .get("Instruction")
            .and_then(|v| v.as_str())
            .unwrap_or("Summarize the game.");
        let context = summaries_context(&self.store).await?;
        Ok(vec![ProviderMessage::user(format!(
            "{context}\n\nQuestion: {question}"
        ))])
    }

    fn stop_check(&self, last: &Step, _steps: &[Step]) -> bool {
        last.response.stop_reason == StopReason::EndTurn && !last.response.text().is_empty()
    }
}

/// Reflects on the quality of the recorded decisions.
pub struct Telepathist {
    store: TelepathistStore,
}

impl Telepathist {
    /// Build the telepathist over a session's sidecar store.
    pub fn new(store: TelepathistStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Agent for Telepathist {
    fn name(&self) -> &str {
        "telepathist"
    }

    fn description(&self) -> &str {
        "Reviews how a recorded session's decisions were made"
    }

    fn tags(&self) -> &[&str] {
        &["review"]
    }

    fn system_prompt(&self, _params: &PlayerParams) -> String {
        "You review the decision-making of an AI strategist across one \
         recorded game. From the phase and turn summaries, identify where \
         the strategy drifted, where a decision contradicted the stated \
         rationale, and which habits to keep. Be specific about turns."
            .to_string()
    }

    fn active_tools(&self) -> Vec<String> {
        vec![]
    }

    async fn initial_messages(
        &self,
        _runtime: &RuntimeHandle,
        _params: &SharedParams,
        input: &serde_json::Value,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Vec<ProviderMessage>, AgentError> {
        let instruction = input
            .get("Instruction")
            .and_then(|v| v.as_str())
            .unwrap_or("Review the session's decision-making.");
        let context = summaries_context(&self.store).await?;
        Ok(vec![ProviderMessage::user(format!(
            "{context}\n\n{instruction}"
        ))])
    }

    fn stop_check(&self, last: &Step, _steps: &[Step]) -> bool {
        last.response.stop_reason == StopReason::EndTurn && !last.response.text().is_empty()
    }
}
