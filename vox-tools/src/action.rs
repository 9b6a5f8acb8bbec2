//! Bridge-action tools: named remote scripts with positional argument
//! marshalling and post-processing.

use crate::strategy::StrategyCatalog;
use crate::validate::SchemaValidator;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use vox_bridge::{BridgeClient, FunctionRegistry, RemoteFunction};
use vox_core::{
    PlayerId, ToolAnnotations, ToolContext, ToolDyn, ToolError, ToolFuture, VoxAction,
    VoxPlayerInfo,
};
use vox_knowledge::KnowledgeStore;

/// Post-processor run after a successful bridge call: audits the change
/// to the knowledge store, emits replay lines, fires observer events,
/// and shapes the tool's final result.
pub type PostProcess = Arc<
    dyn Fn(
            ToolContext,
            serde_json::Value,
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// Pre-check run after schema validation and before the bridge call —
/// argument validation against the strategy catalog lives here.
pub type PreProcess = Arc<
    dyn Fn(
            ToolContext,
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<(), ToolError>> + Send>>
        + Send
        + Sync,
>;

/// Everything a write tool needs. Cloning shares the underlying
/// connections.
#[derive(Clone)]
pub struct ActionDeps {
    /// Remote-function registry over the bridge.
    pub registry: FunctionRegistry,
    /// Knowledge store for decision audits.
    pub knowledge: KnowledgeStore,
    /// Observer/replay publisher.
    pub observer: ObserverPublisher,
    /// Authored strategy/flavor catalog for argument validation.
    pub strategies: StrategyCatalog,
}

/// A write tool backed by one remote function.
///
/// The script body is constant data; input values never appear in it.
/// Schema-named fields map onto the function's positional argument list
/// in declaration order.
pub struct BridgeActionTool {
    name: String,
    description: String,
    validator: SchemaValidator,
    function: RemoteFunction,
    registry: FunctionRegistry,
    pre: Option<PreProcess>,
    post: Option<PostProcess>,
}

impl BridgeActionTool {
    /// Build an action tool. `function.arguments` doubles as the
    /// marshalling order: each argument name is looked up in the parsed
    /// input, absent fields travel as null.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        function: RemoteFunction,
        registry: FunctionRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            validator: SchemaValidator::new(input_schema),
            function,
            registry,
            pre: None,
            post: None,
        }
    }

    /// Attach a pre-check.
    #[must_use]
    pub fn with_pre(mut self, pre: PreProcess) -> Self {
        self.pre = Some(pre);
        self
    }

    /// Attach a post-processor.
    #[must_use]
    pub fn with_post(mut self, post: PostProcess) -> Self {
        self.post = Some(post);
        self
    }

    async fn run(
        &self,
        ctx: ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.validator.validate(&input)?;
        if let Some(pre) = &self.pre {
            pre(ctx.clone(), input.clone()).await?;
        }

        let args: Vec<serde_json::Value> = self
            .function
            .arguments
            .iter()
            .map(|arg| match arg.as_str() {
                // The acting player comes from the call context, never
                // from the model.
                "playerId" => ctx
                    .player
                    .map(|p| serde_json::json!(p.0))
                    .unwrap_or(serde_json::Value::Null),
                other => input.get(other).cloned().unwrap_or(serde_json::Value::Null),
            })
            .collect();

        let result = self
            .registry
            .invoke(&self.function, &args, ctx.deadline)
            .await
            .map_err(ToolError::from)?;

        match &self.post {
            Some(post) => post(ctx, input, result).await,
            None => Ok(result),
        }
    }
}

impl ToolDyn for BridgeActionTool {
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
        serde_json::json!({"type": "object"})
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::default()
    }

    fn call(&self, ctx: ToolContext, input: serde_json::Value) -> ToolFuture<'_> {
        Box::pin(self.run(ctx, input))
    }
}

/// Publishes replay lines and observer events back through the bridge.
///
/// Best-effort: a failed publish is logged and swallowed — the decision
/// itself has already been committed.
#[derive(Clone)]
pub struct ObserverPublisher {
    registry: FunctionRegistry,
}

impl ObserverPublisher {
    /// Build a publisher over the given client.
    pub fn new(client: BridgeClient) -> Self {
        Self {
            registry: FunctionRegistry::new(client),
        }
    }

    /// Share the registry of an existing publisher.
    pub fn with_registry(registry: FunctionRegistry) -> Self {
        Self { registry }
    }

    fn replay_fn() -> RemoteFunction {
        RemoteFunction::new(
            "VoxShowReplay",
            &["playerId", "message"],
            "Game.AddReplayMessage(playerId, message)",
        )
    }

    fn action_fn() -> RemoteFunction {
        RemoteFunction::new(
            "VoxPublishAction",
            &["playerId", "turn", "actionType", "summary", "rationale"],
            "LuaEvents.VoxAction(playerId, turn, actionType, summary, rationale)",
        )
    }

    fn player_info_fn() -> RemoteFunction {
        RemoteFunction::new(
            "VoxPublishPlayerInfo",
            &["playerId", "label"],
            "LuaEvents.VoxPlayerInfo(playerId, label)",
        )
    }

    /// Send a replay line for one player.
    pub async fn replay(&self, player: PlayerId, message: &str) {
        let args = [serde_json::json!(player.0), serde_json::json!(message)];
        if let Err(e) = self.registry.invoke(&Self::replay_fn(), &args, None).await {
            tracing::warn!(player = %player, error = %e, "replay publish failed");
        }
    }

    /// Fire a `VoxAction` observer event.
    pub async fn publish_action(&self, action: &VoxAction) {
        let args = [
            serde_json::json!(action.player.0),
            serde_json::json!(action.turn),
            serde_json::to_value(action.action).unwrap_or_default(),
            serde_json::json!(action.summary),
            serde_json::json!(action.rationale),
        ];
        if let Err(e) = self.registry.invoke(&Self::action_fn(), &args, None).await {
            tracing::warn!(player = %action.player, error = %e, "observer action publish failed");
        }
    }

    /// Fire a `VoxPlayerInfo` observer event.
    pub async fn publish_player_info(&self, info: &VoxPlayerInfo) {
        let args = [
            serde_json::json!(info.player.0),
            serde_json::json!(info.label),
        ];
        if let Err(e) = self
            .registry
            .invoke(&Self::player_info_fn(), &args, None)
            .await
        {
            tracing::warn!(player = %info.player, error = %e, "player info publish failed");
        }
    }
}
