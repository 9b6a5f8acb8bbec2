//! End-to-end write-tool behavior against a mock bridge.

use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vox_bridge::{BridgeClient, FunctionRegistry};
use vox_core::{DecisionMode, PlayerId, ToolContext, ToolError};
use vox_knowledge::KnowledgeStore;
use vox_tools::{ActionDeps, ObserverPublisher, StrategyCatalog, StrategyFiles, build_catalog};

/// Records every function call the mock bridge receives.
type CallLog = Arc<Mutex<Vec<(String, Vec<serde_json::Value>)>>>;

async fn mock_bridge(log: CallLog, fail_calls: bool) -> String {
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
                    if fail_calls && function.starts_with("VoxSet") {
                        return Json(json!({
                            "success": false,
                            "error": {"code": "SCRIPT_ERROR", "message": "game rejected it"}
                        }));
                    }
                    let result = match function.as_str() {
                        "VoxSetRelationship" => {
                            json!({"PreviousPublic": 5, "PreviousPrivate": -2})
                        }
                        _ => json!(true),
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

fn strategy_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| std::fs::write(dir.path().join(name), body).unwrap();
    write(
        "grand-strategy.json",
        r#"{"Conquest": "capitals", "Culture": "tourism", "Science": "spaceship"}"#,
    );
    write("flavors.json", r#"{"Offense": "war", "Growth": "food"}"#);
    write("military.json", "[]");
    write("economic.json", "[]");
    write("event-categories.json", "{}");
    dir
}

async fn deps_for(base_url: &str, dir: &tempfile::TempDir) -> (ActionDeps, KnowledgeStore) {
    let client = BridgeClient::new(base_url).unwrap();
    let registry = FunctionRegistry::new(client);
    let knowledge = KnowledgeStore::open_in_memory().unwrap();
    let deps = ActionDeps {
        registry: registry.clone(),
        knowledge: knowledge.clone(),
        observer: ObserverPublisher::with_registry(registry),
        strategies: StrategyCatalog::new(StrategyFiles {
            dir: dir.path().to_path_buf(),
        }),
    };
    (deps, knowledge)
}

fn rules_fixture(dir: &tempfile::TempDir) -> vox_db::DbGateway {
    let rules = dir.path().join("rules.db");
    let loc = dir.path().join("loc.db");
    let conn = rusqlite::Connection::open(&rules).unwrap();
    conn.execute_batch(
        "CREATE TABLE Technologies (ID INTEGER, Type TEXT, Description TEXT);
         CREATE TABLE Units (ID INTEGER, Type TEXT, Description TEXT, PrereqTech TEXT);
         CREATE TABLE Buildings (ID INTEGER, Type TEXT, Description TEXT, BuildingClass TEXT, PrereqTech TEXT);
         CREATE TABLE BuildingClasses (Type TEXT, MaxGlobalInstances INTEGER, MaxPlayerInstances INTEGER);
         CREATE TABLE Builds (Type TEXT, PrereqTech TEXT, ImprovementType TEXT);
         CREATE TABLE Policies (ID INTEGER, Type TEXT, Description TEXT);
         CREATE TABLE Resources (ID INTEGER, Type TEXT, Description TEXT);
         CREATE TABLE Civilizations (ID INTEGER, Type TEXT, Description TEXT);
         CREATE TABLE Technology_PrereqTechs (TechType TEXT, PrereqTech TEXT);",
    )
    .unwrap();
    drop(conn);
    let conn = rusqlite::Connection::open(&loc).unwrap();
    conn.execute_batch("CREATE TABLE Language_en_US (Tag TEXT, Text TEXT);")
        .unwrap();
    drop(conn);
    vox_db::DbGateway::open(&rules, &loc, "en_US").unwrap()
}

#[tokio::test]
async fn status_quo_audits_with_no_prior_strategy() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let base = mock_bridge(Arc::clone(&log), false).await;
    let dir = strategy_dir();
    let (deps, knowledge) = deps_for(&base, &dir).await;
    let gateway = rules_fixture(&dir);
    let enums = Arc::new(vox_db::EnumCatalog::build(&gateway).await.unwrap());
    let catalog = build_catalog(&gateway, enums, &knowledge, &deps);

    let tool = catalog.get("keep_status_quo").unwrap();
    let ctx = ToolContext::for_player(PlayerId(0), 12, DecisionMode::Strategy);
    tool.call(ctx, json!({"Mode": "Strategy", "Rationale": "hold"}))
        .await
        .unwrap();

    let audits = knowledge
        .get_timed("StrategyChanges", (0, 100), None, None)
        .await
        .unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].payload["Rationale"], "hold");
    assert_eq!(audits[0].payload["MilitaryStratagems"], json!([]));
    assert_eq!(audits[0].payload["EconomicStratagems"], json!([]));

    // Observer event fired with the status-quo action type.
    let calls = log.lock().unwrap();
    let action = calls
        .iter()
        .find(|(name, _)| name == "VoxPublishAction")
        .expect("observer action published");
    assert_eq!(action.1[0], json!(0));
    assert_eq!(action.1[1], json!(12));
    assert_eq!(action.1[2], json!("status-quo"));
}

#[tokio::test]
async fn set_relationship_is_bidirectional_and_audited() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let base = mock_bridge(Arc::clone(&log), false).await;
    let dir = strategy_dir();
    let (deps, knowledge) = deps_for(&base, &dir).await;
    let gateway = rules_fixture(&dir);
    let enums = Arc::new(vox_db::EnumCatalog::build(&gateway).await.unwrap());
    let catalog = build_catalog(&gateway, enums, &knowledge, &deps);

    let tool = catalog.get("set_relationship").unwrap();
    let ctx = ToolContext::for_player(PlayerId(0), 30, DecisionMode::Strategy);
    let out = tool
        .call(
            ctx,
            json!({"Target": 3, "Public": 25, "Private": -10, "Rationale": "deter"}),
        )
        .await
        .unwrap();

    // Previous values come back to the caller.
    assert_eq!(out["PreviousPublic"], 5);
    assert_eq!(out["PreviousPrivate"], -2);
    assert_eq!(out["Public"], 25);

    // Exactly one knowledge row.
    let rows = knowledge
        .get_timed("RelationshipChanges", (0, 100), None, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payload["Target"], 3);
    assert_eq!(rows[0].payload["Rationale"], "deter");

    // Two replay messages: one public, one private.
    let calls = log.lock().unwrap();
    let replays: Vec<_> = calls
        .iter()
        .filter(|(name, _)| name == "VoxShowReplay")
        .collect();
    assert_eq!(replays.len(), 2);
    let texts: Vec<String> = replays
        .iter()
        .map(|(_, args)| args[1].as_str().unwrap().to_string())
        .collect();
    assert!(texts.iter().any(|t| t.contains("Public")));
    assert!(texts.iter().any(|t| t.contains("Private")));
}

#[tokio::test]
async fn set_strategy_validates_against_catalog() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let base = mock_bridge(Arc::clone(&log), false).await;
    let dir = strategy_dir();
    let (deps, knowledge) = deps_for(&base, &dir).await;
    let gateway = rules_fixture(&dir);
    let enums = Arc::new(vox_db::EnumCatalog::build(&gateway).await.unwrap());
    let catalog = build_catalog(&gateway, enums, &knowledge, &deps);

    let tool = catalog.get("set_strategy").unwrap();
    let ctx = ToolContext::for_player(PlayerId(1), 20, DecisionMode::Strategy);

    let err = tool
        .call(
            ctx.clone(),
            json!({"GrandStrategy": "Bananas", "Rationale": "why not"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::InvalidArgument(_)));
    // Nothing reached the bridge.
    assert!(log.lock().unwrap().is_empty());

    tool.call(
        ctx,
        json!({"GrandStrategy": "Culture", "Rationale": "tourism lead"}),
    )
    .await
    .unwrap();
    let (turn, stored) = knowledge
        .get_mutable("Strategy", PlayerId(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(turn, 20);
    assert_eq!(stored["GrandStrategy"], "Culture");
}

#[tokio::test]
async fn bridge_script_failure_surfaces_as_bridge_error() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let base = mock_bridge(log, true).await;
    let dir = strategy_dir();
    let (deps, knowledge) = deps_for(&base, &dir).await;
    let gateway = rules_fixture(&dir);
    let enums = Arc::new(vox_db::EnumCatalog::build(&gateway).await.unwrap());
    let catalog = build_catalog(&gateway, enums, &knowledge, &deps);

    let tool = catalog.get("set_research").unwrap();
    let mut ctx = ToolContext::for_player(PlayerId(0), 9, DecisionMode::Strategy);
    ctx.deadline = Some(Duration::from_secs(5));
    let err = tool
        .call(ctx, json!({"Technology": "TECH_POTTERY", "Rationale": "growth"}))
        .await
        .unwrap_err();
    match err {
        ToolError::Bridge { code, .. } => assert_eq!(code, "SCRIPT_ERROR"),
        other => panic!("expected bridge error, got {other:?}"),
    }
    // No audit row for a failed write.
    assert!(knowledge
        .get_timed("ResearchChanges", (0, 100), None, None)
        .await
        .unwrap()
        .is_empty());
}
