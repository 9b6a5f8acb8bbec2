//! Knowledge-read tools: store queries with visibility enforcement.

use crate::validate::SchemaValidator;
use serde::Deserialize;
use vox_core::{PlayerId, ToolAnnotations, ToolContext, ToolDyn, ToolError, ToolFuture, Visibility};
use vox_knowledge::{EventFilter, KnowledgeStore};

/// What a knowledge-read tool queries.
#[derive(Debug, Clone)]
pub enum ReadKind {
    /// Per-turn snapshots of one kind.
    Timed {
        /// Table-family kind (e.g. `PlayerReport`).
        kind: String,
    },
    /// The latest decision row of one kind for a player.
    Mutable {
        /// Table-family kind (e.g. `Strategy`).
        kind: String,
    },
    /// The game event log.
    Events,
}

/// Keep only the allowed top-level fields of a payload. Applied to rows
/// a viewer may only see at [`Visibility::Basic`].
pub fn project_basic(payload: &serde_json::Value, fields: &[String]) -> serde_json::Value {
    match payload {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(k, _)| fields.iter().any(|f| f == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct TimedInput {
    #[serde(rename = "TurnMin")]
    turn_min: Option<u32>,
    #[serde(rename = "TurnMax")]
    turn_max: Option<u32>,
    #[serde(rename = "Entity")]
    entity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MutableInput {
    #[serde(rename = "Player")]
    player: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct EventsInput {
    #[serde(rename = "TurnMin")]
    turn_min: Option<u32>,
    #[serde(rename = "TurnMax")]
    turn_max: Option<u32>,
    #[serde(rename = "Type")]
    event_type: Option<String>,
    #[serde(rename = "Limit")]
    limit: Option<usize>,
}

/// A read over the knowledge store.
///
/// The caller's [`ToolContext::player`] is the viewer: hidden rows are
/// never returned, and basic rows are projected down to
/// `basic_fields`.
pub struct KnowledgeReadTool {
    name: String,
    description: String,
    store: KnowledgeStore,
    kind: ReadKind,
    basic_fields: Vec<String>,
    validator: SchemaValidator,
}

impl KnowledgeReadTool {
    /// Build a knowledge-read tool.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        store: KnowledgeStore,
        kind: ReadKind,
        basic_fields: Vec<String>,
    ) -> Self {
        let schema = match &kind {
            ReadKind::Timed { .. } => serde_json::json!({
                "type": "object",
                "properties": {
                    "TurnMin": {"type": "integer", "minimum": 0},
                    "TurnMax": {"type": "integer", "minimum": 0},
                    "Entity": {"type": "string"}
                },
                "additionalProperties": false
            }),
            ReadKind::Mutable { .. } => serde_json::json!({
                "type": "object",
                "properties": {
                    "Player": {"type": "integer", "minimum": 0}
                },
                "additionalProperties": false
            }),
            ReadKind::Events => serde_json::json!({
                "type": "object",
                "properties": {
                    "TurnMin": {"type": "integer", "minimum": 0},
                    "TurnMax": {"type": "integer", "minimum": 0},
                    "Type": {"type": "string"},
                    "Limit": {"type": "integer", "minimum": 1}
                },
                "additionalProperties": false
            }),
        };
        Self {
            name: name.into(),
            description: description.into(),
            store,
            kind,
            basic_fields,
            validator: SchemaValidator::new(schema),
        }
    }

    async fn run(
        &self,
        ctx: ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.validator.validate(&input)?;
        let viewer = ctx.player;
        match &self.kind {
            ReadKind::Timed { kind } => {
                let input: TimedInput = parse(input)?;
                let range = (
                    input.turn_min.unwrap_or(0),
                    input.turn_max.or(ctx.turn).unwrap_or(u32::MAX),
                );
                let rows = self
                    .store
                    .get_timed(kind, range, input.entity.as_deref(), viewer)
                    .await
                    .map_err(|e| ToolError::DependencyFailed(e.to_string()))?;
                let items: Vec<serde_json::Value> = rows
                    .into_iter()
                    .map(|row| {
                        let payload = if row.visibility == Visibility::Basic {
                            project_basic(&row.payload, &self.basic_fields)
                        } else {
                            row.payload
                        };
                        serde_json::json!({
                            "Entity": row.entity, "Turn": row.turn, "Data": payload
                        })
                    })
                    .collect();
                Ok(serde_json::json!({"count": items.len(), "items": items}))
            }
            ReadKind::Mutable { kind } => {
                let input: MutableInput = parse(input)?;
                let player = input
                    .player
                    .map(PlayerId)
                    .or(ctx.player)
                    .ok_or_else(|| ToolError::InvalidArgument("Player is required".into()))?;
                match self
                    .store
                    .get_mutable(kind, player)
                    .await
                    .map_err(|e| ToolError::DependencyFailed(e.to_string()))?
                {
                    Some((turn, payload)) => Ok(serde_json::json!({
                        "count": 1,
                        "items": [{"Entity": player.to_string(), "Turn": turn, "Data": payload}]
                    })),
                    None => Ok(serde_json::json!({"count": 0, "items": []})),
                }
            }
            ReadKind::Events => {
                let input: EventsInput = parse(input)?;
                let filter = EventFilter {
                    turn_range: match (input.turn_min, input.turn_max.or(ctx.turn)) {
                        (Some(lo), Some(hi)) => Some((lo, hi)),
                        (Some(lo), None) => Some((lo, u32::MAX - 1)),
                        (None, Some(hi)) => Some((0, hi)),
                        (None, None) => None,
                    },
                    event_type: input.event_type,
                    limit: input.limit,
                };
                let events = self
                    .store
                    .query_events(filter, viewer)
                    .await
                    .map_err(|e| ToolError::DependencyFailed(e.to_string()))?;
                Ok(serde_json::json!({"count": events.len(), "items": events}))
            }
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(input: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidArgument(e.to_string()))
}

impl ToolDyn for KnowledgeReadTool {
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
        serde_json::json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer"},
                "items": {"type": "array"}
            },
            "required": ["count", "items"]
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations {
            read_only: true,
            auto_complete: false,
            markdown: None,
        }
    }

    fn call(&self, ctx: ToolContext, input: serde_json::Value) -> ToolFuture<'_> {
        Box::pin(self.run(ctx, input))
    }
}
