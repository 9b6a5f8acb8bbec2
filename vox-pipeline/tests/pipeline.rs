//! Turn-pipeline behavior against a mock bridge and scripted provider.

use serde_json::json;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use vox_agents::{AgentRuntime, register_catalog};
use vox_bridge::{BridgeClient, BridgeEvent, FunctionRegistry};
use vox_core::{DecisionMode, PlayerId, SessionId, ToolRegistry};
use vox_db::DbGateway;
use vox_knowledge::KnowledgeStore;
use vox_llm::{
    ContentPart, Provider, ProviderError, ProviderRequest, ProviderResponse, StopReason,
    TokenUsage,
};
use vox_pipeline::{KnowledgeRefresher, PipelineConfig, PlayerConfig, TurnPipeline};
use vox_telemetry::{SpanQuery, SpanRecorder, SpanStatus};
use vox_tools::{ActionDeps, ObserverPublisher, StrategyCatalog, StrategyFiles, build_catalog};

type CallLog = Arc<Mutex<Vec<(String, Vec<serde_json::Value>)>>>;

struct MockProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
}

impl Provider for MockProvider {
    fn complete(
        &self,
        _request: ProviderRequest,
    ) -> impl std::future::Future<Output = Result<ProviderResponse, ProviderError>> + Send {
        let response = self.responses.lock().unwrap().pop_front();
        async move {
            response.ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into()))
        }
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: vec![ContentPart::Text { text: text.into() }],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::default(),
        model: "mock".into(),
        cost: None,
    }
}

fn tool_response(name: &str, input: serde_json::Value) -> ProviderResponse {
    ProviderResponse {
        content: vec![ContentPart::ToolUse {
            id: "tu_1".into(),
            name: name.into(),
            input,
        }],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
        model: "mock".into(),
        cost: None,
    }
}

async fn mock_bridge(log: CallLog, fail_mutations: bool) -> String {
    use axum::routing::post;
    use axum::{Json, Router};

    let call_log = Arc::clone(&log);
    let router = Router::new()
        .route(
            "/script/exec",
            post(|| async { Json(json!({"success": true, "result": null})) }),
        )
        .route(
            "/script/call",
            post(move |Json(body): Json<serde_json::Value>| {
                let log = Arc::clone(&call_log);
                async move {
                    let function = body["function"].as_str().unwrap_or("").to_string();
                    let args = body["args"].as_array().cloned().unwrap_or_default();
                    log.lock().unwrap().push((function.clone(), args));
                    if fail_mutations && function == "VoxSetStrategy" {
                        return Json(json!({
                            "success": false,
                            "error": {"code": "SCRIPT_ERROR", "message": "bridge rejected it"}
                        }));
                    }
                    let result = if function.starts_with("VoxGet") {
                        json!([])
                    } else {
                        json!(true)
                    };
                    Json(json!({"success": true, "result": result}))
                }
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

struct Fixture {
    pipeline: TurnPipeline,
    knowledge: KnowledgeStore,
    recorder: SpanRecorder,
    log: CallLog,
    _dirs: (tempfile::TempDir, tempfile::TempDir),
}

async fn fixture(responses: Vec<ProviderResponse>, fail_mutations: bool) -> Fixture {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let base = mock_bridge(Arc::clone(&log), fail_mutations).await;

    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| std::fs::write(dir.path().join(name), body).unwrap();
    write("grand-strategy.json", r#"{"Conquest": "capitals"}"#);
    write("flavors.json", r#"{"Offense": "war"}"#);
    write("military.json", "[]");
    write("economic.json", "[]");
    write("event-categories.json", "{}");

    let rules = dir.path().join("rules.db");
    let loc = dir.path().join("loc.db");
    rusqlite::Connection::open(&rules).unwrap();
    let conn = rusqlite::Connection::open(&loc).unwrap();
    conn.execute_batch("CREATE TABLE Language_en_US (Tag TEXT, Text TEXT);")
        .unwrap();
    drop(conn);
    let gateway = DbGateway::open(&rules, &loc, "en_US").unwrap();

    let client = BridgeClient::new(&base).unwrap();
    let registry = FunctionRegistry::new(client);
    let knowledge = KnowledgeStore::open_in_memory().unwrap();
    let strategies = StrategyCatalog::new(StrategyFiles {
        dir: dir.path().to_path_buf(),
    });
    let observer = ObserverPublisher::with_registry(registry.clone());
    let deps = ActionDeps {
        registry: registry.clone(),
        knowledge: knowledge.clone(),
        observer: observer.clone(),
        strategies: strategies.clone(),
    };
    let enums = Arc::new(vox_db::EnumCatalog::build(&gateway).await.unwrap());
    let tools = build_catalog(&gateway, enums, &knowledge, &deps);

    let telemetry_dir = tempfile::tempdir().unwrap();
    let recorder =
        SpanRecorder::open(telemetry_dir.path(), "games", &SessionId::new("test")).unwrap();

    let runtime = register_catalog(
        AgentRuntime::builder(MockProvider {
            responses: Mutex::new(responses.into()),
        })
        .tools(tools.clone())
        .recorder(recorder.clone()),
        &strategies,
        None,
    )
    .build();

    let refresher = KnowledgeRefresher::new(registry.clone(), gateway, knowledge.clone());
    let mut players = HashMap::new();
    players.insert(
        PlayerId(0),
        PlayerConfig {
            agent: "strategist-simple".into(),
            mode: DecisionMode::Strategy,
            label: "Vox: simple strategist".into(),
        },
    );
    let pipeline = TurnPipeline::new(
        runtime,
        refresher,
        tools,
        registry,
        observer,
        PipelineConfig { players },
    );

    Fixture {
        pipeline,
        knowledge,
        recorder,
        log,
        _dirs: (dir, telemetry_dir),
    }
}

fn ready_count(log: &CallLog) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(name, _)| name == "VoxPlayerReady")
        .count()
}

#[tokio::test]
async fn successful_decision_signals_ready() {
    let fixture = fixture(
        vec![tool_response(
            "keep_status_quo",
            json!({"Rationale": "early game, steady as she goes"}),
        )],
        false,
    )
    .await;

    fixture
        .pipeline
        .process_turn(PlayerId(0), 5, &CancellationToken::new())
        .await;

    assert_eq!(ready_count(&fixture.log), 1);
    let ready = fixture
        .log
        .lock()
        .unwrap()
        .iter()
        .find(|(name, _)| name == "VoxPlayerReady")
        .cloned()
        .unwrap();
    assert_eq!(ready.1[0], json!(0));
    assert_eq!(ready.1[1], json!(5));

    // The player got introduced to the observer overlay once.
    let infos = fixture
        .log
        .lock()
        .unwrap()
        .iter()
        .filter(|(name, _)| name == "VoxPublishPlayerInfo")
        .count();
    assert_eq!(infos, 1);
}

#[tokio::test]
async fn bridge_failure_falls_back_to_status_quo_and_still_readies() {
    // The strategist tries set_strategy, the bridge rejects it, the
    // model gives up; the pipeline must hold course and ready anyway.
    let fixture = fixture(
        vec![
            tool_response(
                "set_strategy",
                json!({"GrandStrategy": "Conquest", "Rationale": "weak neighbor"}),
            ),
            text_response("The bridge rejected my order."),
            text_response("Nothing more to do."),
            text_response("Yielding."),
            text_response("Yielding."),
        ],
        true,
    )
    .await;

    fixture
        .pipeline
        .process_turn(PlayerId(0), 9, &CancellationToken::new())
        .await;

    // Ready despite the failure.
    assert_eq!(ready_count(&fixture.log), 1);

    // The fallback committed a status-quo audit.
    let audits = fixture
        .knowledge
        .get_timed("StrategyChanges", (0, 100), None, None)
        .await
        .unwrap();
    assert_eq!(audits.len(), 1);
    assert!(
        audits[0].payload["Rationale"]
            .as_str()
            .unwrap()
            .starts_with("Holding course")
    );

    // The failed mutation left an error span.
    fixture.recorder.flush().await.unwrap();
    let spans = fixture
        .recorder
        .query(SpanQuery {
            name: Some("tool.set_strategy".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].status, SpanStatus::Error);
}

#[tokio::test]
async fn duplicate_turn_starts_are_deduplicated() {
    let fixture = fixture(
        vec![tool_response(
            "keep_status_quo",
            json!({"Rationale": "steady"}),
        )],
        false,
    )
    .await;

    let (tx, rx) = broadcast::channel(16);
    let pipeline = fixture.pipeline.clone();
    let runner = tokio::spawn(async move { pipeline.run(rx).await });

    let turn_start = BridgeEvent {
        event_type: "TurnStart".into(),
        payload: json!({"id": 7_000_001_i64, "player": 0, "turn": 7}),
        turn: Some(7),
        timestamp: None,
    };
    // The same notification twice, as an SSE reconnect would replay it.
    tx.send(turn_start.clone()).unwrap();
    tx.send(turn_start).unwrap();

    // Give the single surviving run time to finish.
    for _ in 0..50 {
        if ready_count(&fixture.log) >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(ready_count(&fixture.log), 1);

    fixture.pipeline.shutdown();
    runner.abort();
}
