//! The Agent trait — what the runtime needs from each catalog entry.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use vox_core::PlayerParams;
use vox_llm::{ModelTier, ProviderError, ProviderMessage, ProviderResponse};

/// Per-turn parameters, shared between the pipeline, the runtime, and
/// any sub-agents of the same run. Agents must not retain this across
/// turns.
pub type SharedParams = Arc<Mutex<PlayerParams>>;

/// Errors from agent runs.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AgentError {
    /// No agent registered under that name.
    #[error("agent not found: {0}")]
    NotFound(String),

    /// The model backend failed beyond the retry budget.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The caller cancelled the run.
    #[error("cancelled")]
    Cancelled,

    /// Structured output did not validate against the requested schema.
    #[error("structured output invalid: {0}")]
    Output(String),

    /// An invariant broke inside the runtime.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Outcome of one tool call within a step.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    /// Tool name.
    pub name: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// One completed step: the model response plus the tool calls it
/// triggered.
#[derive(Debug, Clone)]
pub struct Step {
    /// The model's response for this step.
    pub response: ProviderResponse,
    /// Outcomes of the tools invoked this step.
    pub tools: Vec<ToolCallOutcome>,
}

impl Step {
    /// Whether any of the named tools succeeded in this step.
    pub fn succeeded_any(&self, names: &[&str]) -> bool {
        self.tools
            .iter()
            .any(|t| t.success && names.contains(&t.name.as_str()))
    }
}

/// Adjustments an agent makes before each step.
#[derive(Debug, Clone, Default)]
pub struct PreparedStep {
    /// Replace the active-tool whitelist for this step.
    pub active_tools: Option<Vec<String>>,
    /// Messages injected before the model call.
    pub extra_messages: Vec<ProviderMessage>,
    /// Provider-specific options merged into the request `extra`.
    pub provider_extra: Option<serde_json::Value>,
}

/// A catalog agent.
///
/// Implementations are registered once at startup and referenced by
/// name; the runtime owns the step loop, agents own prompts, tool
/// policy, and termination.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique agent name.
    fn name(&self) -> &str;

    /// What this agent does — also the description of its
    /// `call_<name>` wrapper tool.
    fn description(&self) -> &str;

    /// Static classification tags.
    fn tags(&self) -> &[&str] {
        &[]
    }

    /// Which capability class to resolve the model from.
    fn tier(&self) -> ModelTier {
        ModelTier::Balanced
    }

    /// The authored system prompt, possibly specialized per player.
    fn system_prompt(&self, params: &PlayerParams) -> String;

    /// Names of catalog tools this agent may see. The runtime enforces
    /// that nothing outside this whitelist (plus generated `call_*`
    /// wrappers) reaches the model.
    fn active_tools(&self) -> Vec<String>;

    /// Input schema of the agent's `call_<name>` wrapper.
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "Instruction": {"type": "string"}
            },
            "additionalProperties": false
        })
    }

    /// Whether `call_*` wrappers disappear from the tool list after
    /// their first use (prevents repeat delegation).
    fn remove_used_subagents(&self) -> bool {
        false
    }

    /// Declared structured-output schema, if the agent always returns
    /// structured output.
    fn output_schema(&self) -> Option<serde_json::Value> {
        None
    }

    /// Short-circuit: a cached result for this input, if the agent
    /// keeps a cache. A hit skips the model entirely.
    async fn check_cache(&self, _input: &serde_json::Value) -> Option<String> {
        None
    }

    /// Build the initial messages. Runs before the step loop; agents
    /// that consult sub-agents (the briefed strategist) do so here via
    /// the runtime handle, under the caller's cancellation token so
    /// cancellation unwinds the whole tree.
    async fn initial_messages(
        &self,
        runtime: &crate::runtime::RuntimeHandle,
        params: &SharedParams,
        input: &serde_json::Value,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Vec<ProviderMessage>, AgentError>;

    /// Per-step adjustments. Default: no changes.
    fn prepare_step(&self, _step_index: u32, _steps: &[Step]) -> PreparedStep {
        PreparedStep::default()
    }

    /// Whether the run is done. Consulted after every step; the
    /// runtime additionally terminates on cancellation and at the step
    /// cap.
    fn stop_check(&self, last: &Step, steps: &[Step]) -> bool;

    /// When set, the runtime caches the agent's final text into
    /// `params.briefings` under this key after every run, so the next
    /// turn's briefing can compare against it.
    fn briefing_key(&self) -> Option<&str> {
        None
    }

    /// Called once with the final output (cache population etc.).
    async fn on_complete(&self, _input: &serde_json::Value, _output: &str) {}
}
