//! Anthropic Messages API provider for vox-llm.
//!
//! Reference: <https://docs.anthropic.com/en/api/messages>

#![deny(missing_docs)]

mod client;
mod mapping;

pub use client::Anthropic;
