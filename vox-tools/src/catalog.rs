//! Catalog assembly: every tool, one registry.

use crate::action::ActionDeps;
use crate::actions::register_action_tools;
use crate::enums::EnumResolveTool;
use crate::knowledge_read::{KnowledgeReadTool, ReadKind};
use crate::queries::register_query_tools;
use std::sync::Arc;
use vox_core::ToolRegistry;
use vox_db::{DbGateway, EnumCatalog};
use vox_knowledge::KnowledgeStore;

/// Build the process-wide tool catalog.
pub fn build_catalog(
    gateway: &DbGateway,
    enums: Arc<EnumCatalog>,
    knowledge: &KnowledgeStore,
    deps: &ActionDeps,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_query_tools(&mut registry, gateway);
    registry.register(Arc::new(EnumResolveTool::new(enums)));
    register_knowledge_tools(&mut registry, knowledge);
    register_action_tools(&mut registry, deps);
    registry
}

fn register_knowledge_tools(registry: &mut ToolRegistry, store: &KnowledgeStore) {
    let timed = |name: &str, description: &str, kind: &str, basic: &[&str]| {
        Arc::new(KnowledgeReadTool::new(
            name,
            description,
            store.clone(),
            ReadKind::Timed { kind: kind.into() },
            basic.iter().map(|s| s.to_string()).collect(),
        ))
    };
    let mutable = |name: &str, description: &str, kind: &str| {
        Arc::new(KnowledgeReadTool::new(
            name,
            description,
            store.clone(),
            ReadKind::Mutable { kind: kind.into() },
            vec![],
        ))
    };

    registry.register(Arc::new(KnowledgeReadTool::new(
        "get_events",
        "Game events, newest last, filtered by turn range and type",
        store.clone(),
        ReadKind::Events,
        vec![],
    )));
    registry.register(timed(
        "get_player_reports",
        "Per-turn standings for every known player",
        "PlayerReport",
        &["Score", "Name", "Civilization"],
    ));
    registry.register(timed(
        "get_city_reports",
        "Per-turn city snapshots",
        "CityReport",
        &["Name", "Population"],
    ));
    registry.register(timed(
        "get_military_reports",
        "Per-turn military zones and unit composition",
        "MilitaryReport",
        &["Zone", "Strength"],
    ));
    registry.register(timed(
        "get_victory_progress",
        "Per-turn progress toward each enabled victory",
        "VictoryProgress",
        &["Victory", "Leader"],
    ));
    registry.register(timed(
        "get_player_options",
        "Per-turn options and active strategies",
        "PlayerOptions",
        &[],
    ));
    registry.register(timed(
        "get_opinions",
        "Per-turn diplomatic opinions between players",
        "Opinions",
        &[],
    ));
    registry.register(mutable(
        "get_strategy",
        "The player's current grand strategy decision",
        "Strategy",
    ));
    registry.register(mutable(
        "get_flavors",
        "The player's current flavor overrides",
        "Flavors",
    ));
}
