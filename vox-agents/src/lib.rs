//! The agent runtime and the agent catalog.
//!
//! An agent is a named, prompted model program with a tool-exposure
//! policy and a stop condition. The runtime assembles each invocation
//! (system prompt, initial messages, scoped tool registry, model by
//! tier), drives the step loop, materializes `call_<agent>` wrappers so
//! agents can delegate to each other, and records one telemetry span
//! per run.
//!
//! The catalog holds the concrete agents: the strategist family
//! (simple, briefed, staffed, deliberative), the briefer family
//! (simple and Military/Economy/Diplomacy specialists), the summarizer
//! utility, and the envoy/telepathist reviewers that read a prior
//! session's telemetry.

#![deny(missing_docs)]

mod agent;
mod catalog;
mod runtime;

pub use agent::{Agent, AgentError, PreparedStep, SharedParams, Step, ToolCallOutcome};
pub use catalog::{
    Briefer, BrieferKind, DeliberativeStrategist, Envoy, Strategist, StrategistConfig,
    StrategistKind, Summarizer, Telepathist, register_catalog,
};
pub use runtime::{
    AgentCall, AgentOutcome, AgentRuntime, AgentRuntimeBuilder, DECISION_TOOLS, RuntimeHandle,
};
