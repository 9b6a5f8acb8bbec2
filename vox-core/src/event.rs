//! Game events and observer events.
//!
//! Event ids pack the turn and a per-turn slot into one integer so the
//! event log stays globally ordered: `id = turn * 1_000_000 + slot`.
//! Native game events allocate slots in the low half of the per-turn
//! space, derived events in the high half — the ranges never collide.

use crate::id::PlayerId;
use crate::visibility::VisibilityMask;
use serde::{Deserialize, Serialize};

/// Width of the per-turn slot space.
pub const TURN_ID_SPAN: i64 = 1_000_000;

/// First slot of the derived (non-native) range within a turn.
pub const DERIVED_SLOT_BASE: i64 = 500_000;

/// A packed event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl EventId {
    /// Pack a native event id: slot must be below [`DERIVED_SLOT_BASE`].
    pub fn native(turn: u32, slot: i64) -> Self {
        debug_assert!(slot < DERIVED_SLOT_BASE);
        Self(i64::from(turn) * TURN_ID_SPAN + slot)
    }

    /// Pack a derived event id: slot counts from [`DERIVED_SLOT_BASE`].
    pub fn derived(turn: u32, slot: i64) -> Self {
        debug_assert!(slot < TURN_ID_SPAN - DERIVED_SLOT_BASE);
        Self(i64::from(turn) * TURN_ID_SPAN + DERIVED_SLOT_BASE + slot)
    }

    /// The turn this id belongs to.
    pub fn turn(self) -> u32 {
        (self.0 / TURN_ID_SPAN) as u32
    }

    /// The slot within the turn.
    pub fn slot(self) -> i64 {
        self.0 % TURN_ID_SPAN
    }

    /// Whether this id sits in the derived range.
    pub fn is_derived(self) -> bool {
        self.slot() >= DERIVED_SLOT_BASE
    }
}

/// One entry of the game event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    /// Packed event id; unique across the whole log.
    pub id: EventId,
    /// Turn the event occurred on. Always equals `id.turn()`.
    pub turn: u32,
    /// Event type name as the game (or the derivation layer) reports it.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload, localized at ingest.
    pub payload: serde_json::Value,
    /// Who may observe this event.
    pub visibility: VisibilityMask,
}

/// The decision categories published to the observer overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    /// Grand strategy changed.
    Strategy,
    /// Flavor weights changed.
    Flavors,
    /// Flavor weights reset to the game's defaults.
    UnsetFlavors,
    /// Research target changed.
    Research,
    /// Civic/policy choice changed.
    Policy,
    /// Relationship offsets toward another player changed.
    Relationship,
    /// Persona (leader personality weights) changed.
    Persona,
    /// No change this turn.
    StatusQuo,
}

/// Observer event: one strategic action taken for one player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoxAction {
    /// Acting player.
    #[serde(rename = "playerID")]
    pub player: PlayerId,
    /// Turn the action was taken on.
    pub turn: u32,
    /// Category of the action.
    #[serde(rename = "actionType")]
    pub action: ActionType,
    /// One-line human-readable summary.
    pub summary: String,
    /// The deciding agent's rationale text.
    pub rationale: String,
}

/// Observer event: labels a controlled player in the overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoxPlayerInfo {
    /// The labelled player.
    #[serde(rename = "playerID")]
    pub player: PlayerId,
    /// Display label (e.g. the agent graph driving this player).
    pub label: String,
}
