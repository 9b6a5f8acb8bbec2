//! Knowledge refresh: pull the game's read-only getters on each turn
//! transition and ingest the results, localized, into the knowledge
//! store.

use serde_json::json;
use vox_bridge::{FunctionRegistry, RemoteFunction};
use vox_core::{EventId, GameEvent, GameMetadata, PlayerId, TurnReport, VisibilityMask};
use vox_db::DbGateway;
use vox_knowledge::{KnowledgeStore, TimedRow};

/// The well-known read-only getters, invoked on the fast path every
/// turn. Each returns an array of `{Key, Data, Visibility?}` records.
fn getter(name: &str, script: &str) -> RemoteFunction {
    RemoteFunction::new(name, &["playerId"], script)
}

fn getters() -> Vec<(&'static str, RemoteFunction)> {
    vec![
        (
            "PlayerReport",
            getter("VoxGetPlayers", "return VoxData.CollectPlayerReports(playerId)"),
        ),
        (
            "CityReport",
            getter("VoxGetCities", "return VoxData.CollectCityReports(playerId)"),
        ),
        (
            "MilitaryReport",
            getter("VoxGetMilitary", "return VoxData.CollectMilitaryZones(playerId)"),
        ),
        (
            "VictoryProgress",
            getter("VoxGetVictory", "return VoxData.CollectVictoryProgress(playerId)"),
        ),
        (
            "PlayerOptions",
            getter("VoxGetOptions", "return VoxData.CollectOptions(playerId)"),
        ),
        (
            "Opinions",
            getter("VoxGetOpinions", "return VoxData.CollectOpinions(playerId)"),
        ),
    ]
}

fn events_getter() -> RemoteFunction {
    RemoteFunction::new(
        "VoxGetEvents",
        &["playerId", "sinceId"],
        "return VoxData.CollectEventsSince(playerId, sinceId)",
    )
}

fn game_info_getter() -> RemoteFunction {
    getter("VoxGetGameInfo", "return VoxData.CollectGameInfo(playerId)")
}

/// Pulls snapshots through the bridge and writes them down.
#[derive(Clone)]
pub struct KnowledgeRefresher {
    registry: FunctionRegistry,
    gateway: DbGateway,
    knowledge: KnowledgeStore,
}

impl KnowledgeRefresher {
    /// Build a refresher.
    pub fn new(
        registry: FunctionRegistry,
        gateway: DbGateway,
        knowledge: KnowledgeStore,
    ) -> Self {
        Self {
            registry,
            gateway,
            knowledge,
        }
    }

    /// Refresh everything for one player and turn; the returned report
    /// seeds the agent's parameter record.
    ///
    /// Getter failures degrade to empty sections rather than block the
    /// turn — the agent can still decide on stale knowledge.
    pub async fn refresh(&self, player: PlayerId, turn: u32) -> TurnReport {
        let mut report = TurnReport::default();

        for (kind, function) in getters() {
            match self.ingest_getter(&function, kind, player, turn).await {
                Ok(section) => match kind {
                    "PlayerReport" => report.players = section,
                    "CityReport" => report.cities = section,
                    "MilitaryReport" => report.military = section,
                    "VictoryProgress" => report.victory = section,
                    "PlayerOptions" => report.options = section,
                    _ => {}
                },
                Err(e) => {
                    tracing::warn!(kind, player = %player, error = %e, "getter failed");
                }
            }
        }

        match self.ingest_events(player, turn).await {
            Ok(events) => report.events = events,
            Err(e) => {
                tracing::warn!(player = %player, error = %e, "event ingest failed");
            }
        }

        report
    }

    /// Static game settings for one player: speed, map, difficulty,
    /// victory types, and the "YouAre" civilization summary. Fetched
    /// once and kept in the store's metadata table; they do not change
    /// within a run.
    pub async fn game_metadata(&self, player: PlayerId) -> GameMetadata {
        let key = format!("game-info-{player}");
        if let Ok(Some(cached)) = self.knowledge.get_meta(&key).await {
            if let Ok(meta) = serde_json::from_str(&cached) {
                return meta;
            }
        }

        let raw = match self
            .registry
            .invoke(&game_info_getter(), &[json!(player.0)], None)
            .await
        {
            Ok(raw) => self.gateway.localize_recursive(&raw).await,
            Err(e) => {
                tracing::warn!(player = %player, error = %e, "game info getter failed");
                return GameMetadata::default();
            }
        };

        let text = |field: &str| {
            raw.get(field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        let meta = GameMetadata {
            speed: text("Speed"),
            map: text("Map"),
            difficulty: text("Difficulty"),
            victory_types: raw
                .get("VictoryTypes")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            you_are: text("YouAre"),
        };
        if let Ok(encoded) = serde_json::to_string(&meta) {
            if let Err(e) = self.knowledge.set_meta(&key, &encoded).await {
                tracing::warn!(error = %e, "game info cache write failed");
            }
        }
        meta
    }

    async fn ingest_getter(
        &self,
        function: &RemoteFunction,
        kind: &str,
        player: PlayerId,
        turn: u32,
    ) -> Result<serde_json::Value, vox_bridge::BridgeError> {
        let raw = self
            .registry
            .invoke(function, &[json!(player.0)], None)
            .await?;
        let localized = self.gateway.localize_recursive(&raw).await;

        let rows: Vec<TimedRow> = localized
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let entity = item.get("Key")?.as_str()?.to_string();
                        let payload = item.get("Data")?.clone();
                        let visibility = item
                            .get("Visibility")
                            .and_then(|v| serde_json::from_value(v.clone()).ok())
                            .unwrap_or_else(|| VisibilityMask::only(player, player.index() + 1));
                        Some(TimedRow {
                            entity,
                            turn,
                            payload,
                            visibility,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if !rows.is_empty() {
            if let Err(e) = self.knowledge.store_timed(kind, rows).await {
                tracing::warn!(kind, error = %e, "snapshot store failed");
            }
        }
        Ok(localized)
    }

    async fn ingest_events(
        &self,
        player: PlayerId,
        turn: u32,
    ) -> Result<Vec<GameEvent>, vox_bridge::BridgeError> {
        let since = self.last_event_id(turn).await;
        let raw = self
            .registry
            .invoke(&events_getter(), &[json!(player.0), json!(since)], None)
            .await?;
        let localized = self.gateway.localize_recursive(&raw).await;

        let mut events = Vec::new();
        if let Some(items) = localized.as_array() {
            for item in items {
                let Some(id) = item.get("id").and_then(|v| v.as_i64()) else {
                    continue;
                };
                let event = GameEvent {
                    id: EventId(id),
                    turn: EventId(id).turn(),
                    event_type: item
                        .get("type")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Unknown")
                        .to_string(),
                    payload: item.get("payload").cloned().unwrap_or(json!(null)),
                    visibility: item
                        .get("visibility")
                        .and_then(|v| serde_json::from_value(v.clone()).ok())
                        .unwrap_or_else(VisibilityMask::default),
                };
                // Append-only and idempotent: replays across reconnects
                // are harmless.
                if let Err(e) = self.knowledge.store_event(event.clone()).await {
                    tracing::warn!(id, error = %e, "event store failed");
                }
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Highest event id already stored before this turn, so the getter
    /// only ships what is new.
    async fn last_event_id(&self, turn: u32) -> i64 {
        match self
            .knowledge
            .query_events(
                vox_knowledge::EventFilter {
                    turn_range: Some((0, turn)),
                    event_type: None,
                    limit: Some(1),
                },
                None,
            )
            .await
        {
            Ok(events) => events.last().map_or(0, |e| e.id.0),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use rusqlite::Connection;
    use vox_bridge::BridgeClient;

    async fn mock_bridge() -> String {
        let router = Router::new()
            .route(
                "/script/exec",
                post(|| async { Json(json!({"success": true, "result": null})) }),
            )
            .route(
                "/script/call",
                post(|Json(body): Json<serde_json::Value>| async move {
                    let function = body["function"].as_str().unwrap_or("");
                    let result = match function {
                        "VoxGetPlayers" => json!([
                            {"Key": "0", "Data": {"Name": "TXT_KEY_CIV_ROME", "Score": 120}},
                            {"Key": "1", "Data": {"Name": "Babylon", "Score": 140}}
                        ]),
                        "VoxGetEvents" => json!([
                            {"id": 12_000_001_i64, "type": "CityFounded",
                             "payload": {"city": "TXT_KEY_CITY_ROME"}, "visibility": [2, 2]}
                        ]),
                        "VoxGetGameInfo" => json!({
                            "Speed": "Standard", "Map": "Continents",
                            "Difficulty": "Immortal",
                            "VictoryTypes": ["Domination", "Science"],
                            "YouAre": "TXT_KEY_CIV_ROME"
                        }),
                        _ => json!([]),
                    };
                    Json(json!({"success": true, "result": result}))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn gateway_fixture(dir: &tempfile::TempDir) -> DbGateway {
        let rules = dir.path().join("rules.db");
        let loc = dir.path().join("loc.db");
        Connection::open(&rules).unwrap();
        let conn = Connection::open(&loc).unwrap();
        conn.execute_batch(
            "CREATE TABLE Language_en_US (Tag TEXT, Text TEXT);
             INSERT INTO Language_en_US VALUES
                 ('TXT_KEY_CIV_ROME', 'Rome'),
                 ('TXT_KEY_CITY_ROME', 'Rome');",
        )
        .unwrap();
        drop(conn);
        DbGateway::open(&rules, &loc, "en_US").unwrap()
    }

    #[tokio::test]
    async fn refresh_localizes_and_stores_snapshots() {
        let base = mock_bridge().await;
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_fixture(&dir);
        let knowledge = KnowledgeStore::open_in_memory().unwrap();
        let refresher = KnowledgeRefresher::new(
            FunctionRegistry::new(BridgeClient::new(&base).unwrap()),
            gateway,
            knowledge.clone(),
        );

        let report = refresher.refresh(PlayerId(0), 12).await;

        // Localization happened during ingest.
        assert_eq!(report.players[0]["Data"]["Name"], "Rome");
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].payload["city"], "Rome");
        assert_eq!(report.events[0].turn, 12);

        // Snapshots landed in the store.
        let rows = knowledge
            .get_timed("PlayerReport", (12, 12), None, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        // Events landed append-only; a second refresh is idempotent.
        refresher.refresh(PlayerId(0), 12).await;
        let events = knowledge
            .query_events(Default::default(), None)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn game_metadata_is_fetched_once_and_cached() {
        let base = mock_bridge().await;
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_fixture(&dir);
        let knowledge = KnowledgeStore::open_in_memory().unwrap();
        let refresher = KnowledgeRefresher::new(
            FunctionRegistry::new(BridgeClient::new(&base).unwrap()),
            gateway,
            knowledge.clone(),
        );

        let meta = refresher.game_metadata(PlayerId(0)).await;
        assert_eq!(meta.speed, "Standard");
        assert_eq!(meta.difficulty, "Immortal");
        assert_eq!(meta.you_are, "Rome");
        assert_eq!(meta.victory_types, vec!["Domination", "Science"]);

        // Served from the metadata table on the second call.
        assert!(knowledge.get_meta("game-info-0").await.unwrap().is_some());
        let again = refresher.game_metadata(PlayerId(0)).await;
        assert_eq!(again.speed, "Standard");
    }
}
