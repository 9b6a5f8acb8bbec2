//! The concrete agents.

mod briefers;
mod reviewers;
mod strategists;
mod summarizer;

pub use briefers::{Briefer, BrieferKind};
pub use reviewers::{Envoy, Telepathist};
pub use strategists::{DeliberativeStrategist, Strategist, StrategistConfig, StrategistKind};
pub use summarizer::Summarizer;

use crate::runtime::AgentRuntimeBuilder;
use std::sync::Arc;
use vox_telemetry::TelepathistStore;
use vox_tools::StrategyCatalog;

/// Register the full live-turn catalog: the strategist family, the
/// briefer family, and the summarizer. The envoy and telepathist join
/// only when a prior session's sidecar store is supplied — they are
/// review agents, not part of the turn loop.
pub fn register_catalog(
    builder: AgentRuntimeBuilder,
    strategies: &StrategyCatalog,
    sidecar: Option<TelepathistStore>,
) -> AgentRuntimeBuilder {
    let mut builder = builder
        .agent(Arc::new(Strategist::new(StrategistConfig {
            kind: StrategistKind::Simple,
            strategies: strategies.clone(),
        })))
        .agent(Arc::new(Strategist::new(StrategistConfig {
            kind: StrategistKind::Briefed,
            strategies: strategies.clone(),
        })))
        .agent(Arc::new(Strategist::new(StrategistConfig {
            kind: StrategistKind::Staffed,
            strategies: strategies.clone(),
        })))
        .agent(Arc::new(DeliberativeStrategist::new(strategies.clone())))
        .agent(Arc::new(Briefer::new(BrieferKind::Simple, strategies.clone())))
        .agent(Arc::new(Briefer::new(BrieferKind::Military, strategies.clone())))
        .agent(Arc::new(Briefer::new(BrieferKind::Economy, strategies.clone())))
        .agent(Arc::new(Briefer::new(BrieferKind::Diplomacy, strategies.clone())));

    builder = match &sidecar {
        Some(store) => builder
            .agent(Arc::new(Summarizer::new(Some(store.clone()))))
            .agent(Arc::new(Envoy::new(store.clone())))
            .agent(Arc::new(Telepathist::new(store.clone()))),
        None => builder.agent(Arc::new(Summarizer::new(None))),
    };
    builder
}
