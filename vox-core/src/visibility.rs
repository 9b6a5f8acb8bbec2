//! Per-player observation levels for knowledge records and events.

use crate::id::PlayerId;
use serde::{Deserialize, Serialize};

/// What one player may observe of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Visibility {
    /// The record must not be returned to this viewer at all.
    Hidden = 0,
    /// Only the basic projection of the record may be returned.
    Basic = 1,
    /// The full record may be returned.
    Full = 2,
}

impl Visibility {
    /// Decode from the stored byte. Unknown values clamp to `Full`
    /// (the store only ever writes 0/1/2).
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Visibility::Hidden,
            1 => Visibility::Basic,
            _ => Visibility::Full,
        }
    }
}

/// Per-player byte array: byte *p* is the [`Visibility`] player *p* has
/// into the record. Players beyond the array's length see `Hidden`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisibilityMask(Vec<u8>);

impl VisibilityMask {
    /// A mask where the given number of players all see the full record.
    pub fn all_full(players: usize) -> Self {
        Self(vec![Visibility::Full as u8; players])
    }

    /// A mask where only `player` sees the full record.
    pub fn only(player: PlayerId, players: usize) -> Self {
        let mut mask = Self(vec![Visibility::Hidden as u8; players]);
        mask.set(player, Visibility::Full);
        mask
    }

    /// Build from raw bytes (e.g. a stored blob).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The stored byte form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// What `viewer` may observe. `None` means an omniscient reader
    /// (the RPC surface, the observer overlay) and always gets `Full`.
    pub fn of(&self, viewer: Option<PlayerId>) -> Visibility {
        match viewer {
            None => Visibility::Full,
            Some(p) => self
                .0
                .get(p.index())
                .copied()
                .map(Visibility::from_byte)
                .unwrap_or(Visibility::Hidden),
        }
    }

    /// Set one player's visibility, growing the array if needed.
    pub fn set(&mut self, player: PlayerId, vis: Visibility) {
        let idx = player.index();
        if self.0.len() <= idx {
            self.0.resize(idx + 1, Visibility::Hidden as u8);
        }
        self.0[idx] = vis as u8;
    }
}

impl Default for VisibilityMask {
    fn default() -> Self {
        Self(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_full_gives_every_player_full() {
        let mask = VisibilityMask::all_full(4);
        for p in 0..4 {
            assert_eq!(mask.of(Some(PlayerId(p))), Visibility::Full);
        }
    }

    #[test]
    fn only_hides_from_everyone_else() {
        let mask = VisibilityMask::only(PlayerId(2), 4);
        assert_eq!(mask.of(Some(PlayerId(2))), Visibility::Full);
        assert_eq!(mask.of(Some(PlayerId(0))), Visibility::Hidden);
        assert_eq!(mask.of(Some(PlayerId(3))), Visibility::Hidden);
    }

    #[test]
    fn out_of_range_viewer_is_hidden() {
        let mask = VisibilityMask::all_full(2);
        assert_eq!(mask.of(Some(PlayerId(9))), Visibility::Hidden);
    }

    #[test]
    fn omniscient_viewer_sees_full() {
        let mask = VisibilityMask::only(PlayerId(0), 8);
        assert_eq!(mask.of(None), Visibility::Full);
    }

    #[test]
    fn set_grows_the_array() {
        let mut mask = VisibilityMask::default();
        mask.set(PlayerId(3), Visibility::Basic);
        assert_eq!(mask.as_bytes(), &[0, 0, 0, 1]);
        assert_eq!(mask.of(Some(PlayerId(3))), Visibility::Basic);
        assert_eq!(mask.of(Some(PlayerId(1))), Visibility::Hidden);
    }

    #[test]
    fn serde_is_a_byte_vector() {
        let mask = VisibilityMask::from_bytes(vec![0, 1, 2]);
        let json = serde_json::to_value(&mask).unwrap();
        assert_eq!(json, serde_json::json!([0, 1, 2]));
        let back: VisibilityMask = serde_json::from_value(json).unwrap();
        assert_eq!(back, mask);
    }
}
