//! The uniform tool abstraction shared by the RPC surface and the agent
//! runtime.

use crate::error::ToolError;
use crate::id::PlayerId;
use crate::params::DecisionMode;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Behavioral hints attached to a tool.
#[derive(Debug, Clone, Default)]
pub struct ToolAnnotations {
    /// The tool performs no writes anywhere.
    pub read_only: bool,
    /// The tool's search argument supports completion.
    pub auto_complete: bool,
    /// Rendering hints for markdown-capable clients.
    pub markdown: Option<serde_json::Value>,
}

/// Caller-supplied context for one tool invocation.
///
/// Carries who is asking (for visibility enforcement and write auditing)
/// and the deadline. An empty context is an omniscient, deadline-less
/// caller — the RPC surface uses that.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The player this call acts for / observes as. `None` = omniscient.
    pub player: Option<PlayerId>,
    /// The turn the call belongs to.
    pub turn: Option<u32>,
    /// The decision mode of the running agent graph.
    pub mode: Option<DecisionMode>,
    /// Deadline for the whole call, including any bridge round-trips.
    pub deadline: Option<Duration>,
}

impl ToolContext {
    /// Context for an agent acting for `player` on `turn`.
    pub fn for_player(player: PlayerId, turn: u32, mode: DecisionMode) -> Self {
        Self {
            player: Some(player),
            turn: Some(turn),
            mode: Some(mode),
            deadline: None,
        }
    }
}

/// Boxed future returned by [`ToolDyn::call`].
pub type ToolFuture<'a> =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + 'a>>;

/// Object-safe trait every tool implements.
///
/// Tools are constructed at startup and immutable thereafter; they are
/// stored as `Arc<dyn ToolDyn>` in a [`ToolRegistry`] shared by the RPC
/// server and the agent runtime.
pub trait ToolDyn: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input.
    fn input_schema(&self) -> serde_json::Value;

    /// JSON Schema for the tool's output.
    fn output_schema(&self) -> serde_json::Value;

    /// Behavioral hints.
    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::default()
    }

    /// Execute the tool with the given context and input.
    fn call(&self, ctx: ToolContext, input: serde_json::Value) -> ToolFuture<'_>;
}

/// Registry of tools keyed by name.
///
/// The process-wide catalog is built once at startup. Agents receive
/// scoped views ([`ToolRegistry::scoped`]) that expose only their
/// whitelisted tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolDyn>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolDyn>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.get(name)
    }

    /// Iterate over all registered tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ToolDyn>> {
        let mut entries: Vec<_> = self.tools.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, t)| t)
    }

    /// A view containing only the named tools. Unknown names are skipped.
    pub fn scoped(&self, names: &[String]) -> ToolRegistry {
        let tools = names
            .iter()
            .filter_map(|n| self.tools.get(n).map(|t| (n.clone(), Arc::clone(t))))
            .collect();
        ToolRegistry { tools }
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
