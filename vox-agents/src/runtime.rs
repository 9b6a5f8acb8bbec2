//! The agent runtime: step loop, tool scoping, sub-agent wrappers,
//! cancellation, retries, and span recording.

use crate::agent::{Agent, AgentError, SharedParams, Step, ToolCallOutcome};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vox_core::{
    SessionId, SpanId, ToolContext, ToolDyn, ToolError, ToolFuture, ToolRegistry, TraceId,
};
use vox_llm::{
    ContentPart, ProviderError, ProviderMessage, ProviderRequest, ProviderResponse, RetryPolicy,
    Role, StopReason, TierMap, ToolSchema, retry,
};
use vox_telemetry::{SpanRecord, SpanRecorder, SpanStatus, new_span_id, now_ns};

/// The tools that count as a strategist's terminal decision.
pub const DECISION_TOOLS: &[&str] = &["set_strategy", "set_flavors", "keep_status_quo"];

/// Safety cap on steps per invocation.
const DEFAULT_MAX_STEPS: u32 = 10;

/// Retries after the model ends its turn without satisfying the
/// agent's stop condition.
const MAX_NUDGES: u32 = 3;

/// Handle agents receive to call back into the runtime. Identical to
/// [`AgentRuntime`]; the alias marks intent at the trait boundary.
pub type RuntimeHandle = AgentRuntime;

/// Object-safe shim over [`vox_llm::Provider`]. The RPITIT trait stays
/// non-object-safe; the runtime is the erasure boundary.
trait ProviderDyn: Send + Sync {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::pin::Pin<
        Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + '_>,
    >;
}

struct ProviderShim<P>(P);

impl<P: vox_llm::Provider> ProviderDyn for ProviderShim<P> {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::pin::Pin<
        Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + '_>,
    > {
        Box::pin(self.0.complete(request))
    }
}

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentCall {
    /// Which agent to run.
    pub agent: String,
    /// Agent input (shape per the agent's input schema).
    pub input: serde_json::Value,
    /// Turn this work belongs to.
    pub turn: u32,
    /// Trace the span joins.
    pub trace: TraceId,
    /// Enclosing span for sub-agent calls.
    pub parent_span: Option<SpanId>,
    /// Structured-output schema override.
    pub output_schema: Option<serde_json::Value>,
    /// Agents already on the call stack — recursion guard.
    pub stack: Vec<String>,
}

impl AgentCall {
    /// A fresh top-level call.
    pub fn new(agent: impl Into<String>, input: serde_json::Value, turn: u32, trace: TraceId) -> Self {
        Self {
            agent: agent.into(),
            input,
            turn,
            trace,
            parent_span: None,
            output_schema: None,
            stack: Vec::new(),
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Final text output.
    pub text: String,
    /// Structured output, when a schema was requested.
    pub structured: Option<serde_json::Value>,
    /// Steps consumed.
    pub steps: u32,
    /// Every tool call made, in order.
    pub tool_calls: Vec<ToolCallOutcome>,
    /// The decision tool that succeeded, if any.
    pub decision: Option<String>,
    /// Whether the result came from the agent's cache.
    pub cached: bool,
}

struct Inner {
    agents: HashMap<String, Arc<dyn Agent>>,
    tools: ToolRegistry,
    provider: Box<dyn ProviderDyn>,
    tiers: TierMap,
    retry: RetryPolicy,
    recorder: Option<SpanRecorder>,
    session: SessionId,
    max_steps: u32,
}

/// The process-wide runtime. Cloning shares all state.
#[derive(Clone)]
pub struct AgentRuntime {
    inner: Arc<Inner>,
}

/// Builder for [`AgentRuntime`].
pub struct AgentRuntimeBuilder {
    agents: HashMap<String, Arc<dyn Agent>>,
    tools: ToolRegistry,
    provider: Box<dyn ProviderDyn>,
    tiers: TierMap,
    retry: RetryPolicy,
    recorder: Option<SpanRecorder>,
    session: SessionId,
    max_steps: u32,
}

impl AgentRuntime {
    /// Start building a runtime over the given provider.
    pub fn builder<P: vox_llm::Provider + 'static>(provider: P) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder {
            agents: HashMap::new(),
            tools: ToolRegistry::new(),
            provider: Box::new(ProviderShim(provider)),
            tiers: TierMap::new(),
            retry: RetryPolicy::default(),
            recorder: None,
            session: SessionId::new("local"),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Names of every registered agent.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.agents.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Run an agent to completion.
    pub async fn call(
        &self,
        call: AgentCall,
        params: &SharedParams,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        let agent = self
            .inner
            .agents
            .get(&call.agent)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(call.agent.clone()))?;

        if let Some(cached) = agent.check_cache(&call.input).await {
            tracing::debug!(agent = %call.agent, "serving cached result");
            return Ok(AgentOutcome {
                text: cached,
                structured: None,
                steps: 0,
                tool_calls: vec![],
                decision: None,
                cached: true,
            });
        }

        let span_id = new_span_id();
        let start = now_ns();
        params.lock().await.running = Some(call.agent.clone());

        let result = self.run_agent(&agent, &call, &span_id, params, cancel).await;

        params.lock().await.running = None;
        self.record_span(&call, &span_id, start, &result);
        result
    }

    async fn run_agent(
        &self,
        agent: &Arc<dyn Agent>,
        call: &AgentCall,
        span_id: &SpanId,
        params: &SharedParams,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        // Scoped view of the catalog plus call_* wrappers for every
        // other agent not already on the stack.
        let base_tools = self.inner.tools.scoped(&agent.active_tools());
        let wrappers = self.build_wrappers(agent, call, span_id, params, cancel);
        let mut registry = base_tools.clone();
        for wrapper in &wrappers {
            registry.register(Arc::clone(wrapper) as Arc<dyn ToolDyn>);
        }

        let mut messages = agent
            .initial_messages(self, params, &call.input, cancel)
            .await?;
        let model = self.inner.tiers.resolve(agent.tier()).to_string();
        let (player, mode) = {
            let p = params.lock().await;
            (p.player, p.mode)
        };

        let mut steps: Vec<Step> = Vec::new();
        let mut nudges = 0u32;
        let mut step_index = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if step_index >= self.inner.max_steps {
                tracing::warn!(agent = %call.agent, "step cap reached");
                break;
            }

            let prepared = agent.prepare_step(step_index, &steps);
            if !prepared.extra_messages.is_empty() {
                messages.extend(prepared.extra_messages.iter().cloned());
            }

            let step_registry = match &prepared.active_tools {
                Some(whitelist) => {
                    let mut scoped = self.inner.tools.scoped(whitelist);
                    for wrapper in &wrappers {
                        if whitelist.contains(&wrapper.tool_name) {
                            scoped.register(Arc::clone(wrapper) as Arc<dyn ToolDyn>);
                        }
                    }
                    scoped
                }
                None => registry.clone(),
            };
            let schemas =
                tool_schemas(&step_registry, &wrappers, agent.remove_used_subagents());

            let system = agent.system_prompt(&*params.lock().await);
            let request = ProviderRequest {
                model: Some(model.clone()),
                messages: messages.clone(),
                tools: schemas,
                max_tokens: Some(4096),
                temperature: None,
                system: Some(system),
                extra: prepared
                    .provider_extra
                    .clone()
                    .unwrap_or(serde_json::Value::Null),
            };

            let llm_start = now_ns();
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                result = retry(&self.inner.retry, || {
                    self.inner.provider.complete(request.clone())
                }) => result?,
            };
            self.record_child_span(
                call,
                span_id,
                "llm.step",
                llm_start,
                serde_json::json!({
                    "model": response.model,
                    "input_tokens": response.usage.input_tokens,
                    "output_tokens": response.usage.output_tokens,
                    "stop_reason": format!("{:?}", response.stop_reason),
                }),
                SpanStatus::Ok,
                None,
            );

            messages.push(ProviderMessage {
                role: Role::Assistant,
                content: response.content.clone(),
            });

            // Execute the step's tool calls concurrently; sub-agent
            // fan-out must not serialize.
            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            let mut outcomes = Vec::new();
            if !tool_uses.is_empty() {
                let ctx = ToolContext {
                    player: Some(player),
                    turn: Some(call.turn),
                    mode: Some(mode),
                    deadline: None,
                };
                let mut set = JoinSet::new();
                for (idx, (id, name, input)) in tool_uses.into_iter().enumerate() {
                    let tool = step_registry.get(&name).cloned();
                    let ctx = ctx.clone();
                    set.spawn(async move {
                        let started = Instant::now();
                        let result = match &tool {
                            Some(tool) => tool.call(ctx, input).await,
                            None => Err(ToolError::NotFound(name.clone())),
                        };
                        (idx, id, name, started.elapsed().as_millis() as u64, result)
                    });
                }
                let mut finished: Vec<_> = Vec::new();
                while let Some(joined) = set.join_next().await {
                    match joined {
                        Ok(item) => finished.push(item),
                        Err(e) => {
                            return Err(AgentError::Runtime(format!("tool task died: {e}")));
                        }
                    }
                }
                finished.sort_by_key(|(idx, ..)| *idx);

                let mut results = Vec::new();
                for (_, id, name, duration_ms, result) in finished {
                    let (content, is_error, success) = match &result {
                        Ok(value) => (
                            serde_json::to_string(value).unwrap_or_default(),
                            false,
                            true,
                        ),
                        Err(e) => (e.to_string(), true, false),
                    };
                    self.record_child_span(
                        call,
                        span_id,
                        &format!("tool.{name}"),
                        now_ns() - (duration_ms as i64) * 1_000_000,
                        serde_json::json!({"tool": name}),
                        if success { SpanStatus::Ok } else { SpanStatus::Error },
                        result.as_ref().err().map(|e| e.to_string()),
                    );
                    results.push(ContentPart::ToolResult {
                        tool_use_id: id,
                        content,
                        is_error,
                    });
                    outcomes.push(ToolCallOutcome {
                        name,
                        success,
                        duration_ms,
                    });
                }
                messages.push(ProviderMessage {
                    role: Role::User,
                    content: results,
                });
            }

            let ended_turn = response.stop_reason == StopReason::EndTurn;
            let step = Step {
                response,
                tools: outcomes,
            };
            steps.push(step);
            step_index += 1;

            if steps
                .last()
                .is_some_and(|last| agent.stop_check(last, &steps))
            {
                break;
            }
            if ended_turn {
                if nudges >= MAX_NUDGES {
                    tracing::warn!(agent = %call.agent, "nudge budget exhausted");
                    break;
                }
                nudges += 1;
                messages.push(ProviderMessage::user(
                    "Execute the appropriate tool call to complete your task.",
                ));
            }
        }

        let text = steps
            .iter()
            .rev()
            .map(|s| s.response.text())
            .find(|t| !t.is_empty())
            .unwrap_or_default();
        let tool_calls: Vec<ToolCallOutcome> =
            steps.iter().flat_map(|s| s.tools.iter().cloned()).collect();
        let decision = tool_calls
            .iter()
            .find(|t| t.success && DECISION_TOOLS.contains(&t.name.as_str()))
            .map(|t| t.name.clone());

        let schema = call.output_schema.clone().or_else(|| agent.output_schema());
        let structured = match schema {
            Some(schema) => Some(self.structured_output(&schema, &text, &mut messages).await?),
            None => None,
        };

        agent.on_complete(&call.input, &text).await;
        if let Some(key) = agent.briefing_key() {
            params
                .lock()
                .await
                .briefings
                .insert(key.to_string(), text.clone());
        }

        Ok(AgentOutcome {
            text,
            structured,
            steps: step_index,
            tool_calls,
            decision,
            cached: false,
        })
    }

    /// Parse and validate structured output, with one corrective round
    /// trip if the final text is not valid against the schema.
    async fn structured_output(
        &self,
        schema: &serde_json::Value,
        text: &str,
        messages: &mut Vec<ProviderMessage>,
    ) -> Result<serde_json::Value, AgentError> {
        if let Some(value) = parse_against(schema, text) {
            return Ok(value);
        }
        messages.push(ProviderMessage::user(format!(
            "Respond with only a JSON object matching this schema:\n{schema}"
        )));
        let request = ProviderRequest {
            model: None,
            messages: messages.clone(),
            tools: vec![],
            max_tokens: Some(4096),
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };
        let response = retry(&self.inner.retry, || {
            self.inner.provider.complete(request.clone())
        })
        .await?;
        let text = response.text();
        parse_against(schema, &text)
            .ok_or_else(|| AgentError::Output(format!("output does not match schema: {text}")))
    }

    fn build_wrappers(
        &self,
        agent: &Arc<dyn Agent>,
        call: &AgentCall,
        span_id: &SpanId,
        params: &SharedParams,
        cancel: &CancellationToken,
    ) -> Vec<Arc<AgentTool>> {
        let mut stack = call.stack.clone();
        stack.push(call.agent.clone());
        self.inner
            .agents
            .values()
            .filter(|other| other.name() != agent.name() && !stack.contains(&other.name().to_string()))
            .map(|other| {
                Arc::new(AgentTool {
                    tool_name: format!("call_{}", other.name().replace('-', "_")),
                    runtime: self.clone(),
                    agent: Arc::clone(other),
                    turn: call.turn,
                    trace: call.trace.clone(),
                    parent_span: span_id.clone(),
                    stack: stack.clone(),
                    params: Arc::clone(params),
                    cancel: cancel.clone(),
                    used: AtomicBool::new(false),
                })
            })
            .collect()
    }

    fn record_span(
        &self,
        call: &AgentCall,
        span_id: &SpanId,
        start: i64,
        result: &Result<AgentOutcome, AgentError>,
    ) {
        let Some(recorder) = &self.inner.recorder else {
            return;
        };
        let (status, message, attributes) = match result {
            Ok(outcome) => (
                SpanStatus::Ok,
                None,
                serde_json::json!({
                    "steps": outcome.steps,
                    "tools": outcome.tool_calls.iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
                    "decision": outcome.decision,
                    "cached": outcome.cached,
                    "output_chars": outcome.text.len(),
                }),
            ),
            Err(e) => (
                SpanStatus::Error,
                Some(e.to_string()),
                serde_json::Value::Null,
            ),
        };
        recorder.record(SpanRecord {
            context_id: self.inner.session.clone(),
            turn: call.turn,
            trace_id: call.trace.clone(),
            span_id: span_id.clone(),
            parent_span_id: call.parent_span.clone(),
            name: call.agent.clone(),
            start_time_ns: start,
            end_time_ns: now_ns(),
            attributes,
            status,
            status_message: message,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn record_child_span(
        &self,
        call: &AgentCall,
        parent: &SpanId,
        name: &str,
        start: i64,
        attributes: serde_json::Value,
        status: SpanStatus,
        message: Option<String>,
    ) {
        let Some(recorder) = &self.inner.recorder else {
            return;
        };
        recorder.record(SpanRecord {
            context_id: self.inner.session.clone(),
            turn: call.turn,
            trace_id: call.trace.clone(),
            span_id: new_span_id(),
            parent_span_id: Some(parent.clone()),
            name: name.to_string(),
            start_time_ns: start,
            end_time_ns: now_ns(),
            attributes,
            status,
            status_message: message,
        });
    }
}

fn parse_against(schema: &serde_json::Value, text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|t| t.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    let validator = jsonschema::validator_for(schema).ok()?;
    validator.is_valid(&value).then_some(value)
}

fn tool_schemas(
    registry: &ToolRegistry,
    wrappers: &[Arc<AgentTool>],
    remove_used: bool,
) -> Vec<ToolSchema> {
    registry
        .iter()
        .filter(|tool| {
            if !remove_used {
                return true;
            }
            // Drop call_* wrappers that already fired once.
            !wrappers
                .iter()
                .any(|w| w.tool_name == tool.name() && w.used.load(Ordering::SeqCst))
        })
        .map(|tool| ToolSchema {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        })
        .collect()
}

/// A `call_<agent>` wrapper: invoking it runs the sub-agent through the
/// runtime and returns its final output.
struct AgentTool {
    tool_name: String,
    runtime: AgentRuntime,
    agent: Arc<dyn Agent>,
    turn: u32,
    trace: TraceId,
    parent_span: SpanId,
    stack: Vec<String>,
    params: SharedParams,
    cancel: CancellationToken,
    used: AtomicBool,
}

impl ToolDyn for AgentTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        self.agent.description()
    }

    fn input_schema(&self) -> serde_json::Value {
        self.agent.input_schema()
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "string"})
    }

    fn call(&self, _ctx: ToolContext, input: serde_json::Value) -> ToolFuture<'_> {
        Box::pin(async move {
            self.used.store(true, Ordering::SeqCst);
            let call = AgentCall {
                agent: self.agent.name().to_string(),
                input,
                turn: self.turn,
                trace: self.trace.clone(),
                parent_span: Some(self.parent_span.clone()),
                output_schema: None,
                stack: self.stack.clone(),
            };
            let outcome = self
                .runtime
                .call(call, &self.params, &self.cancel)
                .await
                .map_err(|e| match e {
                    AgentError::Cancelled => ToolError::Cancelled,
                    other => ToolError::DependencyFailed(other.to_string()),
                })?;
            Ok(serde_json::Value::String(outcome.text))
        })
    }
}

impl AgentRuntimeBuilder {
    /// Use a specific tool catalog.
    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Override the tier map.
    #[must_use]
    pub fn tiers(mut self, tiers: TierMap) -> Self {
        self.tiers = tiers;
        self
    }

    /// Override the provider retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach a span recorder.
    #[must_use]
    pub fn recorder(mut self, recorder: SpanRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Set the session identity for spans.
    #[must_use]
    pub fn session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    /// Override the step cap.
    #[must_use]
    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Register an agent. Last registration of a name wins.
    #[must_use]
    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.insert(agent.name().to_string(), agent);
        self
    }

    /// Finish construction.
    pub fn build(self) -> AgentRuntime {
        AgentRuntime {
            inner: Arc::new(Inner {
                agents: self.agents,
                tools: self.tools,
                provider: self.provider,
                tiers: self.tiers,
                retry: self.retry,
                recorder: self.recorder,
                session: self.session,
                max_steps: self.max_steps,
            }),
        }
    }
}
