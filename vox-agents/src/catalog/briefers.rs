//! The briefer family: one paragraph on the turn, compared against the
//! previous briefing.

use crate::agent::{Agent, AgentError, SharedParams, Step};
use crate::runtime::RuntimeHandle;
use async_trait::async_trait;
use vox_core::{GameEvent, PlayerParams};
use vox_llm::{ModelTier, ProviderMessage, StopReason};
use vox_tools::StrategyCatalog;

/// Which slice of the turn a briefer covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrieferKind {
    /// Everything.
    Simple,
    /// Events categorized Military.
    Military,
    /// Events categorized Economy.
    Economy,
    /// Events categorized Diplomacy.
    Diplomacy,
}

impl BrieferKind {
    fn category(self) -> Option<&'static str> {
        match self {
            BrieferKind::Simple => None,
            BrieferKind::Military => Some("Military"),
            BrieferKind::Economy => Some("Economy"),
            BrieferKind::Diplomacy => Some("Diplomacy"),
        }
    }
}

/// A briefer. Reads the per-turn events (filtered by category for the
/// specialists), compares against its previous briefing, and returns
/// one paragraph.
pub struct Briefer {
    kind: BrieferKind,
    strategies: StrategyCatalog,
}

impl Briefer {
    /// Build a briefer.
    pub fn new(kind: BrieferKind, strategies: StrategyCatalog) -> Self {
        Self { kind, strategies }
    }

    async fn filtered_events(&self, params: &PlayerParams) -> Vec<GameEvent> {
        let Some(category) = self.kind.category() else {
            return params.report.events.clone();
        };
        let set = match self.strategies.get().await {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(error = %e, "event categories unavailable, briefing everything");
                return params.report.events.clone();
            }
        };
        params
            .report
            .events
            .iter()
            .filter(|event| {
                let categories = set.categories_for(&event.event_type);
                // Uncategorized events reach every specialist rather
                // than vanish.
                categories.is_empty() || categories.iter().any(|c| c == category)
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Agent for Briefer {
    fn name(&self) -> &str {
        match self.kind {
            BrieferKind::Simple => "briefer-simple",
            BrieferKind::Military => "briefer-military",
            BrieferKind::Economy => "briefer-economy",
            BrieferKind::Diplomacy => "briefer-diplomacy",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            BrieferKind::Simple => "One paragraph on everything that happened this turn",
            BrieferKind::Military => "One paragraph on the military situation",
            BrieferKind::Economy => "One paragraph on the economic situation",
            BrieferKind::Diplomacy => "One paragraph on the diplomatic situation",
        }
    }

    fn tags(&self) -> &[&str] {
        &["briefer"]
    }

    fn tier(&self) -> ModelTier {
        ModelTier::Fast
    }

    fn system_prompt(&self, _params: &PlayerParams) -> String {
        "You brief a strategist between turns of a 4X game. Write exactly one \
         paragraph: what changed since your previous briefing, what stayed the \
         course, and the single most decision-relevant fact. No lists, no \
         headers."
            .to_string()
    }

    fn active_tools(&self) -> Vec<String> {
        vec![]
    }

    fn briefing_key(&self) -> Option<&str> {
        Some(self.name())
    }

    async fn initial_messages(
        &self,
        _runtime: &RuntimeHandle,
        params: &SharedParams,
        input: &serde_json::Value,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Vec<ProviderMessage>, AgentError> {
        let p = params.lock().await;
        let events = self.filtered_events(&p).await;
        let instruction = input
            .get("Instruction")
            .and_then(|v| v.as_str())
            .unwrap_or("Brief the strategist on this turn.");
        let previous = p
            .briefings
            .get(self.name())
            .map(String::as_str)
            .unwrap_or("(no previous briefing)");

        let events_text =
            serde_json::to_string_pretty(&events).unwrap_or_else(|_| "[]".to_string());
        Ok(vec![ProviderMessage::user(format!(
            "{instruction}\n\nTurn {turn}.\n\nYour previous briefing:\n{previous}\n\n\
             Events in your purview:\n{events_text}",
            turn = p.turn,
        ))])
    }

    fn stop_check(&self, last: &Step, _steps: &[Step]) -> bool {
        last.response.stop_reason == StopReason::EndTurn && !last.response.text().is_empty()
    }
}
