//! Environment-driven configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use vox_core::{DecisionMode, PlayerId};
use vox_pipeline::{PipelineConfig, PlayerConfig};

/// Everything the process reads from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Rules database path (`VOX_RULES_DB`).
    pub rules_db: PathBuf,
    /// Localization database path (`VOX_LOCALIZATION_DB`).
    pub localization_db: PathBuf,
    /// Language code for localization (`VOX_LANGUAGE`, default
    /// `en_US`).
    pub language: String,
    /// Bridge base URL (`VOX_BRIDGE_URL`, default
    /// `http://localhost:8080`).
    pub bridge_url: String,
    /// Telemetry root (`VOX_TELEMETRY_DIR`, default `./telemetry`).
    pub telemetry_dir: PathBuf,
    /// Strategy JSON directory (`VOX_STRATEGY_DIR`, default
    /// `docs/strategies`).
    pub strategy_dir: PathBuf,
    /// Session identity for telemetry (`VOX_SESSION`, default
    /// `local`).
    pub session: String,
    /// Controlled players (`VOX_PLAYERS`).
    pub pipeline: PipelineConfig,
    /// Anthropic API key (`ANTHROPIC_API_KEY`).
    pub api_key: Option<String>,
}

impl Config {
    /// Read the configuration from the environment.
    pub fn from_env() -> Self {
        let env = |key: &str, default: &str| {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        Self {
            rules_db: PathBuf::from(env("VOX_RULES_DB", "game/rules.db")),
            localization_db: PathBuf::from(env(
                "VOX_LOCALIZATION_DB",
                "game/localization.db",
            )),
            language: env("VOX_LANGUAGE", "en_US"),
            bridge_url: env("VOX_BRIDGE_URL", "http://localhost:8080"),
            telemetry_dir: PathBuf::from(env("VOX_TELEMETRY_DIR", "./telemetry")),
            strategy_dir: PathBuf::from(env("VOX_STRATEGY_DIR", "docs/strategies")),
            session: env("VOX_SESSION", "local"),
            pipeline: parse_players(&env("VOX_PLAYERS", "")),
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
        }
    }
}

/// Parse `VOX_PLAYERS`: comma-separated `player[:agent[:mode]]`
/// entries, e.g. `0:strategist-staffed:Strategy,3:strategist-simple:Flavor`.
pub fn parse_players(spec: &str) -> PipelineConfig {
    let mut players = HashMap::new();
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.split(':');
        let Some(id) = parts.next().and_then(|p| p.parse::<u8>().ok()) else {
            tracing::warn!(entry, "unparseable player entry");
            continue;
        };
        let agent = parts.next().unwrap_or("strategist-simple").to_string();
        let mode = match parts.next() {
            Some("Flavor") => DecisionMode::Flavor,
            _ => DecisionMode::Strategy,
        };
        players.insert(
            PlayerId(id),
            PlayerConfig {
                label: format!("Vox: {agent}"),
                agent,
                mode,
            },
        );
    }
    PipelineConfig { players }
}
