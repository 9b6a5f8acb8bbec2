//! Typed identifiers for players, sessions, and telemetry spans.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A player slot in the running game.
///
/// Small integer assigned by the game; also the index into
/// [`VisibilityMask`](crate::VisibilityMask) byte arrays.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u8);

impl PlayerId {
    /// The mask/array index for this player.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for PlayerId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// String-typed ID wrappers prevent mixing up session IDs, trace IDs,
/// and span IDs. These are just strings underneath — no UUID enforcement,
/// no format requirement.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(
    SessionId,
    "Identifies one game run, for telemetry segregation."
);
typed_id!(TraceId, "Groups the spans of one turn-pipeline execution.");
typed_id!(SpanId, "Identifies a single agent-call span.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_index_and_display() {
        let p = PlayerId(3);
        assert_eq!(p.index(), 3);
        assert_eq!(p.to_string(), "3");
    }

    #[test]
    fn player_id_serde_is_transparent() {
        let json = serde_json::to_value(PlayerId(5)).unwrap();
        assert_eq!(json, serde_json::json!(5));
        let back: PlayerId = serde_json::from_value(json).unwrap();
        assert_eq!(back, PlayerId(5));
    }

    #[test]
    fn session_id_roundtrip() {
        let id = SessionId::new("game-2041");
        assert_eq!(id.as_str(), "game-2041");
        assert_eq!(id, SessionId::from("game-2041"));
    }
}
