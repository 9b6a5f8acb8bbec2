//! Per-turn, per-player execution context handed to agents.

use crate::id::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which family of knobs the agent graph adjusts for this player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionMode {
    /// Grand strategy, research, policies, relationships, persona.
    Strategy,
    /// Tactical flavor weights only.
    Flavor,
}

/// Static game settings, read once at startup and stored as metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameMetadata {
    /// Game speed name.
    pub speed: String,
    /// Map script name.
    pub map: String,
    /// Difficulty name.
    pub difficulty: String,
    /// Enabled victory types.
    pub victory_types: Vec<String>,
    /// One-paragraph summary of the controlled civilization ("YouAre").
    pub you_are: String,
}

/// Snapshot of the game state an agent reads at the start of its turn.
/// Sections are localized JSON straight out of the knowledge refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnReport {
    /// Per-player standings report.
    pub players: serde_json::Value,
    /// Cities owned by (or visible to) the player.
    pub cities: serde_json::Value,
    /// Military zones and unit composition.
    pub military: serde_json::Value,
    /// Victory progress for every enabled victory type.
    pub victory: serde_json::Value,
    /// Events since the player's last turn.
    pub events: Vec<crate::event::GameEvent>,
    /// Current options and active strategies.
    pub options: serde_json::Value,
}

/// One working-memory entry. Non-persistent entries are dropped when the
/// turn ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryEntry {
    value: String,
    persistent: bool,
}

/// Per-turn per-player execution context.
///
/// Owned by the turn pipeline and handed to agents by reference for the
/// duration of one turn; agents must not retain it across turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerParams {
    /// The controlled player.
    pub player: PlayerId,
    /// The turn being decided.
    pub turn: u32,
    /// Static game settings.
    pub metadata: GameMetadata,
    /// The refreshed state snapshot for this turn.
    pub report: TurnReport,
    /// Which knob family this run adjusts.
    pub mode: DecisionMode,
    /// Name of the agent currently running for this player, if any.
    pub running: Option<String>,
    /// Briefing texts cached across turns, keyed by briefer name.
    pub briefings: HashMap<String, String>,
    /// Structured game-state archive keyed by turn.
    pub archive: BTreeMap<u32, serde_json::Value>,
    memory: HashMap<String, MemoryEntry>,
}

impl PlayerParams {
    /// Create a context for one player and turn.
    pub fn new(player: PlayerId, turn: u32, mode: DecisionMode) -> Self {
        Self {
            player,
            turn,
            metadata: GameMetadata::default(),
            report: TurnReport::default(),
            mode,
            running: None,
            briefings: HashMap::new(),
            archive: BTreeMap::new(),
            memory: HashMap::new(),
        }
    }

    /// Store a working-memory entry that dies with the turn.
    pub fn remember(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.memory.insert(
            key.into(),
            MemoryEntry {
                value: value.into(),
                persistent: false,
            },
        );
    }

    /// Store a working-memory entry that survives turn transitions.
    pub fn remember_persistent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.memory.insert(
            key.into(),
            MemoryEntry {
                value: value.into(),
                persistent: true,
            },
        );
    }

    /// Read a working-memory entry.
    pub fn recall(&self, key: &str) -> Option<&str> {
        self.memory.get(key).map(|e| e.value.as_str())
    }

    /// Advance to a new turn: archive the old report, drop ephemeral
    /// memory, keep persistent entries and briefings.
    pub fn begin_turn(&mut self, turn: u32, report: TurnReport) {
        if let Ok(old) = serde_json::to_value(&self.report) {
            self.archive.insert(self.turn, old);
        }
        self.turn = turn;
        self.report = report;
        self.running = None;
        self.memory.retain(|_, e| e.persistent);
    }
}
