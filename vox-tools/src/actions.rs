//! The concrete write tools: every mutation a strategist may ship to
//! the game.
//!
//! Each tool pairs a constant remote script with a post-processor that
//! audits the decision into the knowledge store, sends a replay line,
//! and fires the matching observer event. `keep_status_quo` is the one
//! write tool with no bridge dependency at all — it must succeed even
//! when the bridge is down, because the pipeline uses it as the
//! failure fallback.

use crate::action::{ActionDeps, BridgeActionTool, PostProcess, PreProcess};
use crate::validate::SchemaValidator;
use serde_json::json;
use std::sync::Arc;
use vox_bridge::RemoteFunction;
use vox_core::{
    ActionType, DecisionMode, ToolAnnotations, ToolContext, ToolDyn, ToolError, ToolFuture,
    ToolRegistry, VoxAction,
};
use vox_knowledge::TimedRow;

/// Register every write tool into the catalog.
pub fn register_action_tools(registry: &mut ToolRegistry, deps: &ActionDeps) {
    registry.register(set_strategy_tool(deps));
    registry.register(set_flavors_tool(deps));
    registry.register(unset_flavors_tool(deps));
    registry.register(set_research_tool(deps));
    registry.register(set_policy_tool(deps));
    registry.register(set_persona_tool(deps));
    registry.register(set_relationship_tool(deps));
    registry.register(Arc::new(StatusQuoTool::new(deps.clone())));
}

fn ctx_player_turn(ctx: &ToolContext) -> Result<(vox_core::PlayerId, u32), ToolError> {
    match (ctx.player, ctx.turn) {
        (Some(player), Some(turn)) => Ok((player, turn)),
        _ => Err(ToolError::InvalidArgument(
            "this tool requires an acting player and turn".into(),
        )),
    }
}

fn rationale_of(input: &serde_json::Value) -> String {
    input
        .get("Rationale")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Audit a decision, publish a replay line and an observer action.
async fn commit_decision(
    deps: &ActionDeps,
    ctx: &ToolContext,
    kind: &str,
    payload: serde_json::Value,
    action: ActionType,
    summary: String,
) -> Result<serde_json::Value, ToolError> {
    let (player, turn) = ctx_player_turn(ctx)?;
    let rationale = payload
        .get("Rationale")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let outcome = deps
        .knowledge
        .store_mutable(kind, player, turn, payload, None, &["Rationale".into()])
        .await
        .map_err(|e| ToolError::DependencyFailed(e.to_string()))?;

    deps.observer.replay(player, &summary).await;
    deps.observer
        .publish_action(&VoxAction {
            player,
            turn,
            action,
            summary: summary.clone(),
            rationale,
        })
        .await;

    Ok(json!({
        "Changed": matches!(outcome, vox_knowledge::MutationOutcome::Changed { .. }),
        "Summary": summary,
    }))
}

// ─── set_strategy ────────────────────────────────────────────────────

fn set_strategy_tool(deps: &ActionDeps) -> Arc<dyn ToolDyn> {
    let schema = json!({
        "type": "object",
        "properties": {
            "GrandStrategy": {
                "type": "string",
                "description": "One of the authored grand strategies"
            },
            "MilitaryStratagems": {"type": "array", "items": {"type": "string"}},
            "EconomicStratagems": {"type": "array", "items": {"type": "string"}},
            "Rationale": {"type": "string"}
        },
        "required": ["GrandStrategy", "Rationale"],
        "additionalProperties": false
    });
    let function = RemoteFunction::new(
        "VoxSetStrategy",
        &["playerId", "GrandStrategy", "MilitaryStratagems", "EconomicStratagems"],
        "local ai = Players[playerId]:GetGrandStrategyAI()\n\
         ai:SetVoxGrandStrategy(GrandStrategy)\n\
         ai:SetVoxStratagems(MilitaryStratagems, EconomicStratagems)\n\
         return true",
    );

    let pre_deps = deps.clone();
    let pre: PreProcess = Arc::new(move |_ctx, input| {
        let deps = pre_deps.clone();
        Box::pin(async move {
            let name = input["GrandStrategy"].as_str().unwrap_or("");
            deps.strategies.validate_grand_strategy(name).await
        })
    });

    let post_deps = deps.clone();
    let post: PostProcess = Arc::new(move |ctx, input, _result| {
        let deps = post_deps.clone();
        Box::pin(async move {
            let grand = input["GrandStrategy"].as_str().unwrap_or("").to_string();
            let payload = json!({
                "GrandStrategy": grand,
                "MilitaryStratagems": input.get("MilitaryStratagems").cloned().unwrap_or(json!([])),
                "EconomicStratagems": input.get("EconomicStratagems").cloned().unwrap_or(json!([])),
                "Rationale": rationale_of(&input),
            });
            let summary = format!("Grand strategy set to {grand}");
            commit_decision(&deps, &ctx, "Strategy", payload, ActionType::Strategy, summary).await
        })
    });

    Arc::new(
        BridgeActionTool::new(
            "set_strategy",
            "Set the player's grand strategy and active stratagems",
            schema,
            function,
            deps.registry.clone(),
        )
        .with_pre(pre)
        .with_post(post),
    )
}

// ─── set_flavors / unset_flavors ─────────────────────────────────────

fn set_flavors_tool(deps: &ActionDeps) -> Arc<dyn ToolDyn> {
    let schema = json!({
        "type": "object",
        "properties": {
            "Flavors": {
                "type": "object",
                "description": "Flavor name to weight (0-20)",
                "additionalProperties": {"type": "integer", "minimum": 0, "maximum": 20}
            },
            "Rationale": {"type": "string"}
        },
        "required": ["Flavors", "Rationale"],
        "additionalProperties": false
    });
    let function = RemoteFunction::new(
        "VoxSetFlavors",
        &["playerId", "Flavors"],
        "Players[playerId]:GetFlavorManager():SetVoxFlavorOverrides(Flavors)\nreturn true",
    );

    let pre_deps = deps.clone();
    let pre: PreProcess = Arc::new(move |_ctx, input| {
        let deps = pre_deps.clone();
        Box::pin(async move {
            match input["Flavors"].as_object() {
                Some(weights) => deps.strategies.validate_flavors(weights).await,
                None => Err(ToolError::InvalidArgument("Flavors must be an object".into())),
            }
        })
    });

    let post_deps = deps.clone();
    let post: PostProcess = Arc::new(move |ctx, input, _result| {
        let deps = post_deps.clone();
        Box::pin(async move {
            let payload = json!({
                "Flavors": input.get("Flavors").cloned().unwrap_or(json!({})),
                "Rationale": rationale_of(&input),
            });
            let count = input["Flavors"].as_object().map_or(0, |m| m.len());
            let summary = format!("Adjusted {count} flavor weights");
            commit_decision(&deps, &ctx, "Flavors", payload, ActionType::Flavors, summary).await
        })
    });

    Arc::new(
        BridgeActionTool::new(
            "set_flavors",
            "Override the player's tactical flavor weights",
            schema,
            function,
            deps.registry.clone(),
        )
        .with_pre(pre)
        .with_post(post),
    )
}

fn unset_flavors_tool(deps: &ActionDeps) -> Arc<dyn ToolDyn> {
    let schema = json!({
        "type": "object",
        "properties": {"Rationale": {"type": "string"}},
        "required": ["Rationale"],
        "additionalProperties": false
    });
    let function = RemoteFunction::new(
        "VoxUnsetFlavors",
        &["playerId"],
        "Players[playerId]:GetFlavorManager():ClearVoxFlavorOverrides()\nreturn true",
    );

    let post_deps = deps.clone();
    let post: PostProcess = Arc::new(move |ctx, input, _result| {
        let deps = post_deps.clone();
        Box::pin(async move {
            let payload = json!({
                "Flavors": {},
                "Rationale": rationale_of(&input),
            });
            commit_decision(
                &deps,
                &ctx,
                "Flavors",
                payload,
                ActionType::UnsetFlavors,
                "Flavor overrides cleared".to_string(),
            )
            .await
        })
    });

    Arc::new(
        BridgeActionTool::new(
            "unset_flavors",
            "Clear flavor overrides, returning control to the game's defaults",
            schema,
            function,
            deps.registry.clone(),
        )
        .with_post(post),
    )
}

// ─── set_research / set_policy / set_persona ─────────────────────────

fn set_research_tool(deps: &ActionDeps) -> Arc<dyn ToolDyn> {
    let schema = json!({
        "type": "object",
        "properties": {
            "Technology": {
                "type": "string",
                "description": "Technology Type constant, e.g. TECH_POTTERY"
            },
            "Rationale": {"type": "string"}
        },
        "required": ["Technology", "Rationale"],
        "additionalProperties": false
    });
    let function = RemoteFunction::new(
        "VoxSetResearch",
        &["playerId", "Technology"],
        "local tech = GameInfoTypes[Technology]\n\
         if tech == nil then error('unknown technology') end\n\
         Players[playerId]:PushResearch(tech, true)\n\
         return true",
    );

    let post_deps = deps.clone();
    let post: PostProcess = Arc::new(move |ctx, input, _result| {
        let deps = post_deps.clone();
        Box::pin(async move {
            let tech = input["Technology"].as_str().unwrap_or("").to_string();
            let payload = json!({
                "Technology": tech,
                "Rationale": rationale_of(&input),
            });
            let summary = format!("Research redirected to {tech}");
            commit_decision(&deps, &ctx, "Research", payload, ActionType::Research, summary).await
        })
    });

    Arc::new(
        BridgeActionTool::new(
            "set_research",
            "Redirect the player's research to a technology",
            schema,
            function,
            deps.registry.clone(),
        )
        .with_post(post),
    )
}

fn set_policy_tool(deps: &ActionDeps) -> Arc<dyn ToolDyn> {
    let schema = json!({
        "type": "object",
        "properties": {
            "Policy": {
                "type": "string",
                "description": "Policy or branch Type constant, e.g. POLICY_TRADITION"
            },
            "Rationale": {"type": "string"}
        },
        "required": ["Policy", "Rationale"],
        "additionalProperties": false
    });
    let function = RemoteFunction::new(
        "VoxSetPolicy",
        &["playerId", "Policy"],
        "local policy = GameInfoTypes[Policy]\n\
         if policy == nil then error('unknown policy') end\n\
         Players[playerId]:SetVoxPolicyPreference(policy)\n\
         return true",
    );

    let post_deps = deps.clone();
    let post: PostProcess = Arc::new(move |ctx, input, _result| {
        let deps = post_deps.clone();
        Box::pin(async move {
            let policy = input["Policy"].as_str().unwrap_or("").to_string();
            let payload = json!({
                "Policy": policy,
                "Rationale": rationale_of(&input),
            });
            let summary = format!("Civic preference set to {policy}");
            commit_decision(&deps, &ctx, "Policy", payload, ActionType::Policy, summary).await
        })
    });

    Arc::new(
        BridgeActionTool::new(
            "set_policy",
            "Steer the player's next civic/policy choice",
            schema,
            function,
            deps.registry.clone(),
        )
        .with_post(post),
    )
}

fn set_persona_tool(deps: &ActionDeps) -> Arc<dyn ToolDyn> {
    let schema = json!({
        "type": "object",
        "properties": {
            "Persona": {
                "type": "object",
                "description": "Leader personality weights",
                "additionalProperties": {"type": "integer", "minimum": 0, "maximum": 12}
            },
            "Rationale": {"type": "string"}
        },
        "required": ["Persona", "Rationale"],
        "additionalProperties": false
    });
    let function = RemoteFunction::new(
        "VoxSetPersona",
        &["playerId", "Persona"],
        "Players[playerId]:SetVoxPersonality(Persona)\nreturn true",
    );

    let post_deps = deps.clone();
    let post: PostProcess = Arc::new(move |ctx, input, _result| {
        let deps = post_deps.clone();
        Box::pin(async move {
            let payload = json!({
                "Persona": input.get("Persona").cloned().unwrap_or(json!({})),
                "Rationale": rationale_of(&input),
            });
            commit_decision(
                &deps,
                &ctx,
                "Persona",
                payload,
                ActionType::Persona,
                "Leader persona adjusted".to_string(),
            )
            .await
        })
    });

    Arc::new(
        BridgeActionTool::new(
            "set_persona",
            "Adjust the leader's personality weights",
            schema,
            function,
            deps.registry.clone(),
        )
        .with_post(post),
    )
}

// ─── set_relationship ────────────────────────────────────────────────

fn set_relationship_tool(deps: &ActionDeps) -> Arc<dyn ToolDyn> {
    let schema = json!({
        "type": "object",
        "properties": {
            "Target": {"type": "integer", "minimum": 0, "description": "Target player id"},
            "Public": {"type": "integer", "minimum": -100, "maximum": 100},
            "Private": {"type": "integer", "minimum": -100, "maximum": 100},
            "Rationale": {"type": "string"}
        },
        "required": ["Target", "Public", "Private", "Rationale"],
        "additionalProperties": false
    });
    // Returns the previous offsets so the caller can see what changed.
    let function = RemoteFunction::new(
        "VoxSetRelationship",
        &["playerId", "Target", "Public", "Private"],
        "local diplo = Players[playerId]:GetDiplomacyAI()\n\
         local prevPublic, prevPrivate = diplo:GetVoxOpinionOffsets(Target)\n\
         diplo:SetVoxOpinionOffsets(Target, Public, Private)\n\
         return { PreviousPublic = prevPublic, PreviousPrivate = prevPrivate }",
    );

    let post_deps = deps.clone();
    let post: PostProcess = Arc::new(move |ctx, input, result| {
        let deps = post_deps.clone();
        Box::pin(async move {
            let (player, turn) = ctx_player_turn(&ctx)?;
            let target = input["Target"].as_i64().unwrap_or(-1);
            let public = input["Public"].as_i64().unwrap_or(0);
            let private = input["Private"].as_i64().unwrap_or(0);
            let rationale = rationale_of(&input);

            deps.knowledge
                .store_timed(
                    "RelationshipChanges",
                    vec![TimedRow {
                        entity: player.to_string(),
                        turn,
                        payload: json!({
                            "Target": target,
                            "Public": public,
                            "Private": private,
                            "PreviousPublic": result.get("PreviousPublic").cloned(),
                            "PreviousPrivate": result.get("PreviousPrivate").cloned(),
                            "Rationale": rationale,
                        }),
                        visibility: vox_core::VisibilityMask::only(player, player.index() + 1),
                    }],
                )
                .await
                .map_err(|e| ToolError::DependencyFailed(e.to_string()))?;

            // The public stance is announced; the private one only shows
            // in the acting player's own replay.
            deps.observer
                .replay(player, &format!("Public stance toward player {target}: {public:+}"))
                .await;
            deps.observer
                .replay(player, &format!("Private stance toward player {target}: {private:+}"))
                .await;
            deps.observer
                .publish_action(&VoxAction {
                    player,
                    turn,
                    action: ActionType::Relationship,
                    summary: format!("Stance toward player {target} set to {public:+}/{private:+}"),
                    rationale,
                })
                .await;

            Ok(json!({
                "Target": target,
                "Public": public,
                "Private": private,
                "PreviousPublic": result.get("PreviousPublic").cloned(),
                "PreviousPrivate": result.get("PreviousPrivate").cloned(),
            }))
        })
    });

    Arc::new(
        BridgeActionTool::new(
            "set_relationship",
            "Set public and private opinion offsets toward another player",
            schema,
            function,
            deps.registry.clone(),
        )
        .with_post(post),
    )
}

// ─── keep_status_quo ─────────────────────────────────────────────────

/// The fallback tool: records "no change this turn" without touching
/// the bridge. Always available, even mid-outage.
struct StatusQuoTool {
    deps: ActionDeps,
    validator: SchemaValidator,
}

fn status_quo_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "Mode": {"type": "string", "enum": ["Strategy", "Flavor"]},
            "Rationale": {"type": "string"}
        },
        "required": ["Rationale"],
        "additionalProperties": false
    })
}

impl StatusQuoTool {
    fn new(deps: ActionDeps) -> Self {
        Self {
            deps,
            validator: SchemaValidator::new(status_quo_schema()),
        }
    }

    async fn run(
        &self,
        ctx: ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.validator.validate(&input)?;
        let (player, turn) = ctx_player_turn(&ctx)?;
        let rationale = rationale_of(&input);
        let mode = match input.get("Mode").and_then(|v| v.as_str()) {
            Some("Strategy") => DecisionMode::Strategy,
            Some("Flavor") => DecisionMode::Flavor,
            Some(other) => {
                return Err(ToolError::InvalidArgument(format!("unknown mode {other:?}")));
            }
            None => ctx.mode.unwrap_or(DecisionMode::Strategy),
        };

        let kind = match mode {
            DecisionMode::Strategy => "Strategy",
            DecisionMode::Flavor => "Flavors",
        };
        // Re-assert whatever is current; with no prior decision the
        // audit records explicitly-empty choices.
        let current = self
            .deps
            .knowledge
            .get_mutable(kind, player)
            .await
            .map_err(|e| ToolError::DependencyFailed(e.to_string()))?;
        let mut payload = match current {
            Some((_, payload)) => payload,
            None => match mode {
                DecisionMode::Strategy => json!({
                    "GrandStrategy": null,
                    "MilitaryStratagems": [],
                    "EconomicStratagems": [],
                }),
                DecisionMode::Flavor => json!({"Flavors": {}}),
            },
        };
        if let Some(map) = payload.as_object_mut() {
            map.insert("Rationale".into(), json!(rationale));
        }

        self.deps
            .knowledge
            .store_mutable(kind, player, turn, payload, None, &["Rationale".into()])
            .await
            .map_err(|e| ToolError::DependencyFailed(e.to_string()))?;

        let summary = "No changes this turn".to_string();
        self.deps.observer.replay(player, &summary).await;
        self.deps
            .observer
            .publish_action(&VoxAction {
                player,
                turn,
                action: ActionType::StatusQuo,
                summary: summary.clone(),
                rationale,
            })
            .await;

        Ok(json!({"Summary": summary}))
    }
}

impl ToolDyn for StatusQuoTool {
    fn name(&self) -> &str {
        "keep_status_quo"
    }

    fn description(&self) -> &str {
        "Explicitly keep the current strategy or flavors unchanged this turn"
    }

    fn input_schema(&self) -> serde_json::Value {
        status_quo_schema()
    }

    fn output_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::default()
    }

    fn call(&self, ctx: ToolContext, input: serde_json::Value) -> ToolFuture<'_> {
        Box::pin(self.run(ctx, input))
    }
}
