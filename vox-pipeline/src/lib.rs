//! The per-player turn controller.
//!
//! Turn-start events flow from the bridge into per-player FIFOs; for
//! each one the pipeline refreshes derived knowledge, runs the
//! configured agent graph, publishes the outcome, and signals the
//! player ready. Players run concurrently; one player never has two
//! turns in flight; a superseded run is cancelled. Whatever happens —
//! agent failure, bridge outage, cancellation — the game is never left
//! waiting: a failed turn still commits keep-status-quo and signals
//! ready.

#![deny(missing_docs)]

mod pipeline;
mod refresh;

pub use pipeline::{PipelineConfig, PlayerConfig, TurnPipeline};
pub use refresh::KnowledgeRefresher;
