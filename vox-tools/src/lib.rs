//! The tool catalog.
//!
//! Every operation the decision layer can perform — reading the rules
//! database, reading derived knowledge, mutating game state through the
//! bridge — is a [`ToolDyn`](vox_core::ToolDyn) in one shared registry,
//! consumed both by the RPC surface and by the agent runtime.
//!
//! Four tool kinds:
//! - [`DatabaseQueryTool`]: summary-list + full-record loaders over the
//!   rules database, with tiered search.
//! - [`KnowledgeReadTool`]: visibility-enforced queries over the
//!   knowledge store.
//! - [`BridgeActionTool`]: a named remote script plus positional
//!   argument mapping and post-processing (knowledge audit, replay
//!   line, observer event).
//! - Agent-callable wrappers, materialized by the agent runtime.
//!
//! The [`StrategyCatalog`] loads the authored strategy/flavor JSON
//! files and validates tool arguments against them.

#![deny(missing_docs)]

mod action;
mod actions;
mod catalog;
mod enums;
mod knowledge_read;
mod queries;
mod query;
mod search;
mod strategy;
mod validate;

pub use action::{ActionDeps, BridgeActionTool, ObserverPublisher, PostProcess, PreProcess};
pub use actions::register_action_tools;
pub use catalog::build_catalog;
pub use enums::EnumResolveTool;
pub use knowledge_read::{KnowledgeReadTool, ReadKind, project_basic};
pub use queries::register_query_tools;
pub use query::{DatabaseQueryTool, FullLoader, SummaryLoader};
pub use search::{SearchTier, rank};
pub use strategy::{StrategyCatalog, StrategyFiles};
pub use validate::SchemaValidator;
