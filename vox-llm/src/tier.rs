//! Model tiers: agents hint at a capability class, users map classes
//! to concrete model identifiers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capability class an agent asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheap and quick — briefers, summarizers.
    Fast,
    /// The default strategist tier.
    Balanced,
    /// Expensive deliberation — the multi-voice strategist.
    Deep,
}

/// Tier → model id mapping with user overrides applied on top of the
/// built-in defaults.
#[derive(Debug, Clone)]
pub struct TierMap {
    models: HashMap<ModelTier, String>,
}

impl TierMap {
    /// The built-in defaults.
    pub fn new() -> Self {
        let mut models = HashMap::new();
        models.insert(ModelTier::Fast, "claude-haiku-4-5".to_string());
        models.insert(ModelTier::Balanced, "claude-sonnet-4-5".to_string());
        models.insert(ModelTier::Deep, "claude-opus-4-5".to_string());
        Self { models }
    }

    /// Override one tier.
    #[must_use]
    pub fn with(mut self, tier: ModelTier, model: impl Into<String>) -> Self {
        self.models.insert(tier, model.into());
        self
    }

    /// Resolve a tier to its model id.
    pub fn resolve(&self, tier: ModelTier) -> &str {
        // new() populates every tier, so the lookup cannot miss.
        self.models
            .get(&tier)
            .map(String::as_str)
            .unwrap_or("claude-sonnet-4-5")
    }
}

impl Default for TierMap {
    fn default() -> Self {
        Self::new()
    }
}
