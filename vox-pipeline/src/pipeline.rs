//! The per-player turn loop.

use crate::refresh::KnowledgeRefresher;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use vox_agents::{AgentCall, AgentError, AgentRuntime, SharedParams};
use vox_bridge::{BridgeEvent, EventBuffer, FunctionRegistry, RemoteFunction};
use vox_core::{DecisionMode, PlayerId, PlayerParams, ToolContext, ToolRegistry, TraceId, VoxPlayerInfo};
use vox_tools::ObserverPublisher;

/// Per-player pipeline configuration.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Which agent graph decides for this player.
    pub agent: String,
    /// Which knob family the graph adjusts.
    pub mode: DecisionMode,
    /// Observer overlay label.
    pub label: String,
}

/// Which players the pipeline controls.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Controlled players.
    pub players: HashMap<PlayerId, PlayerConfig>,
}

fn player_ready_fn() -> RemoteFunction {
    RemoteFunction::new(
        "VoxPlayerReady",
        &["playerId", "turn"],
        "Game.VoxNotifyReady(playerId, turn)\nreturn true",
    )
}

struct Worker {
    queue: mpsc::UnboundedSender<u32>,
    active: Arc<std::sync::Mutex<Option<CancellationToken>>>,
}

struct Inner {
    runtime: AgentRuntime,
    refresher: KnowledgeRefresher,
    tools: ToolRegistry,
    registry: FunctionRegistry,
    observer: ObserverPublisher,
    config: PipelineConfig,
    params: Mutex<HashMap<PlayerId, SharedParams>>,
    workers: Mutex<HashMap<PlayerId, Worker>>,
    seen_turn_starts: Mutex<HashSet<i64>>,
    introduced: Mutex<HashSet<PlayerId>>,
    shutdown: CancellationToken,
}

/// The pipeline. Cloning shares all state.
#[derive(Clone)]
pub struct TurnPipeline {
    inner: Arc<Inner>,
}

impl TurnPipeline {
    /// Build a pipeline.
    pub fn new(
        runtime: AgentRuntime,
        refresher: KnowledgeRefresher,
        tools: ToolRegistry,
        registry: FunctionRegistry,
        observer: ObserverPublisher,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                refresher,
                tools,
                registry,
                observer,
                config,
                params: Mutex::new(HashMap::new()),
                workers: Mutex::new(HashMap::new()),
                seen_turn_starts: Mutex::new(HashSet::new()),
                introduced: Mutex::new(HashSet::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Consume the bridge event stream until shutdown.
    ///
    /// Incoming events land in a bounded buffer first (oldest
    /// non-turn-start dropped on overflow; turn-starts never dropped),
    /// then turn-starts are de-duplicated by event id — the stream does
    /// not guarantee uniqueness across reconnects — and fanned out to
    /// per-player FIFOs.
    pub async fn run(&self, mut events: broadcast::Receiver<BridgeEvent>) {
        let mut buffer = EventBuffer::new();
        loop {
            let event = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => {
                    buffer.push(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "pipeline lagged behind the event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
            // Take whatever else has already arrived before working
            // through the backlog.
            while let Ok(event) = events.try_recv() {
                buffer.push(event);
            }
            while let Some(event) = buffer.pop() {
                if event.is_turn_start() {
                    self.on_turn_start(event).await;
                }
            }
        }
    }

    /// Stop dispatching and cancel active runs.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    async fn on_turn_start(&self, event: BridgeEvent) {
        let Some(player) = event
            .payload
            .get("player")
            .and_then(|p| p.as_u64())
            .map(|p| PlayerId(p as u8))
        else {
            tracing::warn!("turn-start without player id");
            return;
        };
        let Some(turn) = event
            .turn
            .or_else(|| event.payload.get("turn").and_then(|t| t.as_u64()).map(|t| t as u32))
        else {
            tracing::warn!(player = %player, "turn-start without turn number");
            return;
        };
        if !self.inner.config.players.contains_key(&player) {
            return;
        }
        if let Some(id) = event.event_id() {
            let mut seen = self.inner.seen_turn_starts.lock().await;
            if !seen.insert(id) {
                tracing::debug!(id, "duplicate turn-start dropped");
                return;
            }
        }
        self.dispatch(player, turn).await;
    }

    async fn dispatch(&self, player: PlayerId, turn: u32) {
        let mut workers = self.inner.workers.lock().await;
        let worker = workers.entry(player).or_insert_with(|| {
            let (queue, mut rx) = mpsc::unbounded_channel::<u32>();
            let active: Arc<std::sync::Mutex<Option<CancellationToken>>> =
                Arc::new(std::sync::Mutex::new(None));
            let pipeline = self.clone();
            let slot = Arc::clone(&active);
            tokio::spawn(async move {
                // One turn in flight per player, in arrival order.
                while let Some(turn) = rx.recv().await {
                    let token = CancellationToken::new();
                    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
                    pipeline.process_turn(player, turn, &token).await;
                    *slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
                }
            });
            Worker { queue, active }
        });

        // A newer turn supersedes whatever is still running.
        if let Some(token) = worker
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            tracing::info!(player = %player, turn, "cancelling superseded run");
            token.cancel();
        }
        let _ = worker.queue.send(turn);
    }

    /// One full turn for one player: refresh → run → publish → ready.
    pub async fn process_turn(&self, player: PlayerId, turn: u32, cancel: &CancellationToken) {
        let Some(config) = self.inner.config.players.get(&player) else {
            return;
        };
        tracing::info!(player = %player, turn, agent = %config.agent, "processing turn");

        let report = self.inner.refresher.refresh(player, turn).await;
        let params = {
            let mut map = self.inner.params.lock().await;
            let entry = map.entry(player).or_insert_with(|| {
                Arc::new(Mutex::new(PlayerParams::new(player, turn, config.mode)))
            });
            entry.lock().await.begin_turn(turn, report);
            Arc::clone(entry)
        };
        if params.lock().await.metadata.you_are.is_empty() {
            let metadata = self.inner.refresher.game_metadata(player).await;
            params.lock().await.metadata = metadata;
        }

        if self.inner.introduced.lock().await.insert(player) {
            self.inner
                .observer
                .publish_player_info(&VoxPlayerInfo {
                    player,
                    label: config.label.clone(),
                })
                .await;
        }

        let call = AgentCall::new(
            config.agent.clone(),
            json!({}),
            turn,
            TraceId::new(format!("p{player}-t{turn}")),
        );
        match self.inner.runtime.call(call, &params, cancel).await {
            Ok(outcome) if outcome.decision.is_some() => {
                let summary = one_line(&outcome.text, 200);
                if !summary.is_empty() {
                    self.inner.observer.replay(player, &summary).await;
                }
            }
            Ok(_) => {
                tracing::warn!(player = %player, turn, "agent committed no decision");
                self.fallback(player, turn, config.mode, "the advisor reached no decision")
                    .await;
            }
            Err(AgentError::Cancelled) => {
                // Superseded by a newer turn-start (or shutdown); the
                // replacement turn owns the ready signal.
                tracing::info!(player = %player, turn, "run cancelled");
                return;
            }
            Err(e) => {
                tracing::error!(player = %player, turn, error = %e, "agent failed");
                self.fallback(player, turn, config.mode, &e.to_string()).await;
            }
        }

        self.signal_ready(player, turn).await;
    }

    /// The safe fallback: commit keep-status-quo so the game never
    /// stalls on a missing decision.
    async fn fallback(&self, player: PlayerId, turn: u32, mode: DecisionMode, reason: &str) {
        let Some(tool) = self.inner.tools.get("keep_status_quo") else {
            tracing::error!("keep_status_quo missing from the catalog");
            return;
        };
        let ctx = ToolContext::for_player(player, turn, mode);
        let mode_name = match mode {
            DecisionMode::Strategy => "Strategy",
            DecisionMode::Flavor => "Flavor",
        };
        let input = json!({
            "Mode": mode_name,
            "Rationale": format!("Holding course: {reason}"),
        });
        if let Err(e) = tool.call(ctx, input).await {
            tracing::error!(player = %player, turn, error = %e, "fallback tool failed");
        }
    }

    async fn signal_ready(&self, player: PlayerId, turn: u32) {
        let args = [json!(player.0), json!(turn)];
        if let Err(e) = self
            .inner
            .registry
            .invoke(&player_ready_fn(), &args, None)
            .await
        {
            tracing::error!(player = %player, turn, error = %e, "player-ready signal failed");
        }
    }
}

fn one_line(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    let mut line = line.to_string();
    if line.len() > max {
        let mut cut = max;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_line_takes_first_line_and_respects_char_boundaries() {
        assert_eq!(one_line("decided\nrest", 100), "decided");
        assert_eq!(one_line("  padded  ", 100), "padded");
        // Truncation never splits a multibyte character.
        let truncated = one_line("ééééé", 3);
        assert!(truncated.len() <= 3);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }
}
