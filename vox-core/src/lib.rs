//! # vox-core — Protocol types for the vox strategic decision layer
//!
//! This crate defines the vocabulary every other vox crate speaks:
//!
//! | Concern | Types |
//! |---------|-------|
//! | Errors | [`ErrorKind`], [`VoxError`], [`ToolError`] |
//! | Identity | [`PlayerId`], [`SessionId`], [`TraceId`], [`SpanId`] |
//! | Visibility | [`Visibility`], [`VisibilityMask`] |
//! | Events | [`GameEvent`], [`VoxAction`], [`VoxPlayerInfo`], [`ActionType`] |
//! | Per-turn context | [`PlayerParams`], [`DecisionMode`], [`GameMetadata`] |
//! | Tools | [`ToolDyn`], [`ToolRegistry`], [`ToolContext`], [`ToolAnnotations`] |
//!
//! ## Design Principle
//!
//! Types here are operation-defined, not mechanism-defined. A [`ToolDyn`]
//! is "something the model or an RPC client may invoke by name" — whether
//! it reads a rules database, queries derived knowledge, or ships a script
//! to the game is the implementing crate's concern. This is what lets the
//! tool catalog, the agent runtime, and the RPC server share one registry.
//!
//! ## Dependency Notes
//!
//! This crate depends on `serde_json::Value` for payload fields (event
//! payloads, tool inputs, error details). JSON is the interchange format
//! at every boundary of this system — the bridge, the knowledge store,
//! and the model provider all speak it.

#![deny(missing_docs)]

pub mod error;
pub mod event;
pub mod id;
pub mod params;
pub mod tool;
pub mod visibility;

pub use error::{ErrorKind, ToolError, VoxError, VoxResult};
pub use event::{ActionType, EventId, GameEvent, VoxAction, VoxPlayerInfo};
pub use id::{PlayerId, SessionId, SpanId, TraceId};
pub use params::{DecisionMode, GameMetadata, PlayerParams, TurnReport};
pub use tool::{ToolAnnotations, ToolContext, ToolDyn, ToolFuture, ToolRegistry};
pub use visibility::{Visibility, VisibilityMask};
