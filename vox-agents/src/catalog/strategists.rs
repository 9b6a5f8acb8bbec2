//! The strategist family.

use crate::agent::{Agent, AgentError, SharedParams, Step};
use crate::runtime::{AgentCall, DECISION_TOOLS, RuntimeHandle};
use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vox_core::PlayerParams;
use vox_llm::{ModelTier, ProviderMessage};
use vox_tools::StrategyCatalog;

/// Payload size above which the staffed strategist fans out the three
/// specialized briefers instead of one combined briefer.
const STAFF_THRESHOLD_BYTES: usize = 5 * 1024;

/// Every tool a strategist may see.
fn strategist_tools() -> Vec<String> {
    [
        "get_technology",
        "get_unit",
        "get_building",
        "get_policy",
        "get_resource",
        "get_civilization",
        "resolve_enum",
        "get_events",
        "get_player_reports",
        "get_city_reports",
        "get_military_reports",
        "get_victory_progress",
        "get_player_options",
        "get_opinions",
        "get_strategy",
        "get_flavors",
        "set_strategy",
        "set_flavors",
        "unset_flavors",
        "set_research",
        "set_policy",
        "set_persona",
        "set_relationship",
        "keep_status_quo",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

const STRATEGIST_PROMPT: &str = "\
You are the strategic advisor of a nation in a turn-based 4X game. The \
game's own tactical engine moves units, manages build queues, and \
assigns workers; you only turn the high-level knobs: grand strategy, \
research target, civic preference, flavor weights, persona, and \
relationships toward other players.

Read the situation, consult the lookup tools when you need rules \
detail, then commit exactly one decision for this turn by calling \
set_strategy, set_flavors, or keep_status_quo. You may additionally \
adjust research, policy, persona, or relationships when the situation \
calls for it. Every mutation takes a Rationale: one or two sentences a \
spectator can follow.";

const DELIBERATIVE_PROMPT: &str = "\
You are a council of three voices advising a nation in a turn-based 4X \
game: the Marshal, who sees only threats and opportunities of force; \
the Steward, who sees only growth, gold, and science; and the Herald, \
who sees only treaties, opinions, and votes. Before deciding anything, \
let each voice state its case in one short paragraph. Then, as the \
council, weigh the three cases against the current grand strategy and \
commit one decision for this turn by calling set_strategy, \
set_flavors, or keep_status_quo, with a Rationale that names which \
voice prevailed and why. Never commit a decision before all three \
voices have spoken.";

/// Which strategist variant to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategistKind {
    /// One shot over the raw per-turn report.
    Simple,
    /// Consults the combined briefer first.
    Briefed,
    /// Fans out specialized briefers on busy turns.
    Staffed,
}

/// Construction parameters shared by the strategist variants.
#[derive(Clone)]
pub struct StrategistConfig {
    /// Which variant.
    pub kind: StrategistKind,
    /// The authored strategy catalog for the options section.
    pub strategies: StrategyCatalog,
}

/// The simple, briefed, and staffed strategists. One implementation;
/// the variants differ in how they source their situation briefing.
pub struct Strategist {
    config: StrategistConfig,
}

impl Strategist {
    /// Build a strategist.
    pub fn new(config: StrategistConfig) -> Self {
        Self { config }
    }

    async fn options_section(&self) -> String {
        match self.config.strategies.get().await {
            Ok(set) => {
                let mut lines = vec!["Grand strategies:".to_string()];
                let mut names: Vec<_> = set.grand_strategies.iter().collect();
                names.sort_by(|a, b| a.0.cmp(b.0));
                for (name, description) in names {
                    lines.push(format!("- {name}: {description}"));
                }
                lines.push("Military stratagems:".to_string());
                for item in &set.military {
                    if let Some(name) = item.get("name").and_then(|n| n.as_str()) {
                        lines.push(format!("- {name}"));
                    }
                }
                lines.push("Economic stratagems:".to_string());
                for item in &set.economic {
                    if let Some(name) = item.get("name").and_then(|n| n.as_str()) {
                        lines.push(format!("- {name}"));
                    }
                }
                lines.join("\n")
            }
            Err(e) => {
                tracing::warn!(error = %e, "strategy catalog unavailable");
                String::new()
            }
        }
    }

    /// The staffed fan-out: specialized briefers in parallel on busy
    /// turns, the combined briefer otherwise.
    async fn staffed_briefing(
        &self,
        runtime: &RuntimeHandle,
        params: &SharedParams,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let (events_size, turn, trace) = {
            let p = params.lock().await;
            let size = serde_json::to_string(&p.report.events)
                .map(|s| s.len())
                .unwrap_or(0);
            (size, p.turn, vox_core::TraceId::new(format!("turn-{}", p.turn)))
        };

        if events_size <= STAFF_THRESHOLD_BYTES {
            let outcome = runtime
                .call(
                    AgentCall::new(
                        "briefer-simple",
                        serde_json::json!({"Instruction": "Brief the strategist on this turn."}),
                        turn,
                        trace,
                    ),
                    params,
                    cancel,
                )
                .await?;
            return Ok(outcome.text);
        }

        let mut set = JoinSet::new();
        for briefer in ["briefer-military", "briefer-economy", "briefer-diplomacy"] {
            let runtime = runtime.clone();
            let params = params.clone();
            let trace = trace.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let outcome = runtime
                    .call(
                        AgentCall::new(
                            briefer,
                            serde_json::json!({"Instruction": "Brief your domain for this turn."}),
                            turn,
                            trace,
                        ),
                        &params,
                        &cancel,
                    )
                    .await;
                (briefer, outcome)
            });
        }

        let mut sections = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (briefer, outcome) =
                joined.map_err(|e| AgentError::Runtime(format!("briefer task died: {e}")))?;
            match outcome {
                Ok(outcome) => sections.push((briefer, outcome.text)),
                Err(e) => {
                    tracing::warn!(briefer, error = %e, "specialized briefer failed");
                    sections.push((briefer, "(briefing unavailable)".to_string()));
                }
            }
        }
        sections.sort_by_key(|(name, _)| *name);
        Ok(sections
            .into_iter()
            .map(|(name, text)| format!("[{name}]\n{text}"))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// The common situation header.
fn situation(params: &PlayerParams) -> String {
    format!(
        "Turn {turn}, playing as player {player}.\n\
         You are: {you_are}\n\
         Game: {speed} speed, {map}, {difficulty} difficulty.\n\
         Victory types enabled: {victories}.",
        turn = params.turn,
        player = params.player,
        you_are = params.metadata.you_are,
        speed = params.metadata.speed,
        map = params.metadata.map,
        difficulty = params.metadata.difficulty,
        victories = params.metadata.victory_types.join(", "),
    )
}

fn report_section(params: &PlayerParams) -> String {
    format!(
        "Players:\n{players}\n\nVictory progress:\n{victory}\n\nYour options and active strategies:\n{options}",
        players = params.report.players,
        victory = params.report.victory,
        options = params.report.options,
    )
}

fn events_section(params: &PlayerParams) -> String {
    match serde_json::to_string_pretty(&params.report.events) {
        Ok(events) => format!("Events since your last turn:\n{events}"),
        Err(_) => String::new(),
    }
}

#[async_trait]
impl Agent for Strategist {
    fn name(&self) -> &str {
        match self.config.kind {
            StrategistKind::Simple => "strategist-simple",
            StrategistKind::Briefed => "strategist-briefed",
            StrategistKind::Staffed => "strategist-staffed",
        }
    }

    fn description(&self) -> &str {
        match self.config.kind {
            StrategistKind::Simple => "Decides the turn's strategic knobs from the raw report",
            StrategistKind::Briefed => "Decides the turn's strategic knobs from a briefing",
            StrategistKind::Staffed => {
                "Decides the turn's strategic knobs from specialist briefings"
            }
        }
    }

    fn tags(&self) -> &[&str] {
        &["strategist"]
    }

    fn system_prompt(&self, _params: &PlayerParams) -> String {
        STRATEGIST_PROMPT.to_string()
    }

    fn active_tools(&self) -> Vec<String> {
        strategist_tools()
    }

    fn remove_used_subagents(&self) -> bool {
        true
    }

    async fn initial_messages(
        &self,
        runtime: &RuntimeHandle,
        params: &SharedParams,
        _input: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProviderMessage>, AgentError> {
        let options = self.options_section().await;

        let briefing = match self.config.kind {
            StrategistKind::Simple => None,
            StrategistKind::Briefed => {
                let (focus, turn, trace) = {
                    let p = params.lock().await;
                    (
                        p.recall("briefing-focus").map(str::to_string),
                        p.turn,
                        vox_core::TraceId::new(format!("turn-{}", p.turn)),
                    )
                };
                let instruction = focus
                    .unwrap_or_else(|| "Brief the strategist on this turn.".to_string());
                let outcome = runtime
                    .call(
                        AgentCall::new(
                            "briefer-simple",
                            serde_json::json!({"Instruction": instruction}),
                            turn,
                            trace,
                        ),
                        params,
                        cancel,
                    )
                    .await?;
                Some(outcome.text)
            }
            StrategistKind::Staffed => {
                Some(self.staffed_briefing(runtime, params, cancel).await?)
            }
        };

        let p = params.lock().await;
        let mut text = situation(&p);
        text.push_str("\n\n");
        text.push_str(&options);
        text.push_str("\n\n");
        text.push_str(&report_section(&p));
        text.push_str("\n\n");
        match briefing {
            Some(briefing) => {
                text.push_str("Briefing:\n");
                text.push_str(&briefing);
            }
            None => text.push_str(&events_section(&p)),
        }
        text.push_str("\n\nCommit exactly one decision for this turn.");

        Ok(vec![ProviderMessage::user(text)])
    }

    fn stop_check(&self, last: &Step, _steps: &[Step]) -> bool {
        last.succeeded_any(DECISION_TOOLS)
    }
}

/// The deliberative strategist: one multi-voice prompt, review before
/// decide, deeper model tier.
pub struct DeliberativeStrategist {
    inner: Strategist,
}

impl DeliberativeStrategist {
    /// Build the deliberative strategist.
    pub fn new(strategies: StrategyCatalog) -> Self {
        Self {
            inner: Strategist::new(StrategistConfig {
                kind: StrategistKind::Simple,
                strategies,
            }),
        }
    }
}

#[async_trait]
impl Agent for DeliberativeStrategist {
    fn name(&self) -> &str {
        "strategist-deliberative"
    }

    fn description(&self) -> &str {
        "Three-voice council that reviews before deciding"
    }

    fn tags(&self) -> &[&str] {
        &["strategist", "deliberative"]
    }

    fn tier(&self) -> ModelTier {
        ModelTier::Deep
    }

    fn system_prompt(&self, _params: &PlayerParams) -> String {
        DELIBERATIVE_PROMPT.to_string()
    }

    fn active_tools(&self) -> Vec<String> {
        strategist_tools()
    }

    async fn initial_messages(
        &self,
        runtime: &RuntimeHandle,
        params: &SharedParams,
        input: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProviderMessage>, AgentError> {
        self.inner
            .initial_messages(runtime, params, input, cancel)
            .await
    }

    fn stop_check(&self, last: &Step, _steps: &[Step]) -> bool {
        last.succeeded_any(DECISION_TOOLS)
    }
}
