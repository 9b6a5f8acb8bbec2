//! Process assembly: open everything, wire everything, serve.

use crate::config::Config;
use thiserror::Error;
use vox_agents::{AgentRuntime, register_catalog};
use vox_bridge::{BridgeClient, EventBroker, FunctionRegistry};
use vox_core::SessionId;
use vox_db::DbGateway;
use vox_knowledge::KnowledgeStore;
use vox_pipeline::{KnowledgeRefresher, TurnPipeline};
use vox_provider_anthropic::Anthropic;
use vox_rpc::RpcServer;
use vox_telemetry::SpanRecorder;
use vox_tools::{ActionDeps, ObserverPublisher, StrategyCatalog, StrategyFiles, build_catalog};

/// Fatal failures, split by exit code.
#[derive(Debug, Error)]
pub enum AppError {
    /// Initialization failed — exit code 1.
    #[error("initialization failed: {0}")]
    Init(String),

    /// Anything after successful initialization — exit code 2.
    #[error("internal error: {0}")]
    Internal(String),
}

/// The assembled process.
pub struct App {
    /// Shared tool catalog, served over RPC and to agents.
    pub rpc: RpcServer,
    /// The per-player turn controller.
    pub pipeline: TurnPipeline,
    /// The bridge event fan-out.
    pub broker: EventBroker,
    /// The remote-function registry (for reconnect invalidation).
    pub registry: FunctionRegistry,
    /// Span persistence, flushed at shutdown.
    pub recorder: SpanRecorder,
}

impl App {
    /// Open databases, connect the bridge, build the catalog and the
    /// runtime, and wire the pipeline. Any failure here is fatal.
    pub async fn build(config: &Config) -> Result<Self, AppError> {
        let gateway = DbGateway::open(
            &config.rules_db,
            &config.localization_db,
            config.language.clone(),
        )
        .map_err(|e| AppError::Init(e.to_string()))?;
        let enums = std::sync::Arc::new(
            vox_db::EnumCatalog::build(&gateway)
                .await
                .map_err(|e| AppError::Init(e.to_string()))?,
        );

        let knowledge_path = config.telemetry_dir.join("knowledge.db");
        std::fs::create_dir_all(&config.telemetry_dir)
            .map_err(|e| AppError::Init(e.to_string()))?;
        let knowledge =
            KnowledgeStore::open(&knowledge_path).map_err(|e| AppError::Init(e.to_string()))?;

        let client =
            BridgeClient::new(&config.bridge_url).map_err(|e| AppError::Init(e.to_string()))?;
        let registry = FunctionRegistry::new(client.clone());
        let observer = ObserverPublisher::with_registry(registry.clone());
        let strategies = StrategyCatalog::new(StrategyFiles {
            dir: config.strategy_dir.clone(),
        });

        let deps = ActionDeps {
            registry: registry.clone(),
            knowledge: knowledge.clone(),
            observer: observer.clone(),
            strategies: strategies.clone(),
        };
        let tools = build_catalog(&gateway, enums, &knowledge, &deps);

        let session = SessionId::new(config.session.clone());
        let recorder = SpanRecorder::open(&config.telemetry_dir, "sessions", &session)
            .map_err(|e| AppError::Init(e.to_string()))?;

        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Init("ANTHROPIC_API_KEY is not set".into()))?;
        let runtime = register_catalog(
            AgentRuntime::builder(Anthropic::new(api_key))
                .tools(tools.clone())
                .recorder(recorder.clone())
                .session(session),
            &strategies,
            None,
        )
        .build();

        let broker = EventBroker::start(client);
        let _invalidator = registry.spawn_invalidator(broker.subscribe());

        let refresher = KnowledgeRefresher::new(registry.clone(), gateway, knowledge);
        let pipeline = TurnPipeline::new(
            runtime,
            refresher,
            tools.clone(),
            registry.clone(),
            observer,
            config.pipeline.clone(),
        );

        Ok(Self {
            rpc: RpcServer::new(tools),
            pipeline,
            broker,
            registry,
            recorder,
        })
    }

    /// Run the pipeline consumer in the background.
    pub fn start_pipeline(&self) -> tokio::task::JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let events = self.broker.subscribe();
        tokio::spawn(async move { pipeline.run(events).await })
    }

    /// Orderly teardown: stop dispatching, stop the event reader, and
    /// flush spans.
    pub async fn shutdown(&self) {
        self.pipeline.shutdown();
        self.broker.shutdown();
        if let Err(e) = self.recorder.flush().await {
            tracing::warn!(error = %e, "span flush failed at shutdown");
        }
    }
}
