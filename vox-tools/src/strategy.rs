//! The authored strategy/flavor catalog.
//!
//! Four JSON files under `docs/strategies/` describe the knobs the
//! strategist may turn: grand strategies, flavor weights, and the
//! military/economic stratagem lists. A fifth file maps event types to
//! briefer categories. Loaded on demand and cached with a TTL so a
//! running server picks up edits without a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use vox_core::ToolError;

/// Default cache TTL.
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Well-known file names under the strategy directory.
#[derive(Debug, Clone)]
pub struct StrategyFiles {
    /// Directory holding the JSON files (`docs/strategies`).
    pub dir: PathBuf,
}

impl StrategyFiles {
    /// The conventional location relative to the working directory.
    pub fn default_dir() -> Self {
        Self {
            dir: PathBuf::from("docs/strategies"),
        }
    }
}

/// One loaded snapshot of the catalog.
#[derive(Debug, Clone, Default)]
pub struct StrategySet {
    /// Grand strategy name → short description.
    pub grand_strategies: HashMap<String, String>,
    /// Flavor name → description.
    pub flavors: HashMap<String, String>,
    /// Military stratagems.
    pub military: Vec<serde_json::Value>,
    /// Economic stratagems.
    pub economic: Vec<serde_json::Value>,
    /// Event type → briefer categories.
    pub event_categories: HashMap<String, Vec<String>>,
}

impl StrategySet {
    /// Categories for one event type. Unknown types report no
    /// categories and land in every combined briefing.
    pub fn categories_for(&self, event_type: &str) -> &[String] {
        self.event_categories
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// TTL-cached loader over the authored files.
#[derive(Clone)]
pub struct StrategyCatalog {
    dir: PathBuf,
    ttl: Duration,
    cache: Arc<RwLock<Option<(Instant, Arc<StrategySet>)>>>,
}

impl StrategyCatalog {
    /// Catalog over the given directory with the default TTL.
    pub fn new(files: StrategyFiles) -> Self {
        Self::with_ttl(files, DEFAULT_TTL)
    }

    /// Catalog with an explicit TTL (tests use a zero TTL).
    pub fn with_ttl(files: StrategyFiles, ttl: Duration) -> Self {
        Self {
            dir: files.dir,
            ttl,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// The current catalog snapshot, reloading if the cache is stale.
    pub async fn get(&self) -> Result<Arc<StrategySet>, ToolError> {
        {
            let cache = self.cache.read().await;
            if let Some((at, set)) = cache.as_ref() {
                if at.elapsed() < self.ttl {
                    return Ok(Arc::clone(set));
                }
            }
        }
        let set = Arc::new(load_set(&self.dir).await?);
        let mut cache = self.cache.write().await;
        *cache = Some((Instant::now(), Arc::clone(&set)));
        Ok(set)
    }

    /// Fail with `invalid-argument` unless `name` is an authored grand
    /// strategy.
    pub async fn validate_grand_strategy(&self, name: &str) -> Result<(), ToolError> {
        let set = self.get().await?;
        if set.grand_strategies.contains_key(name) {
            Ok(())
        } else {
            let mut known: Vec<&str> = set.grand_strategies.keys().map(String::as_str).collect();
            known.sort_unstable();
            Err(ToolError::InvalidArgument(format!(
                "unknown grand strategy {name:?}; expected one of {}",
                known.join(", ")
            )))
        }
    }

    /// Fail with `invalid-argument` unless every key of `weights` is an
    /// authored flavor.
    pub async fn validate_flavors(
        &self,
        weights: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ToolError> {
        let set = self.get().await?;
        for name in weights.keys() {
            if !set.flavors.contains_key(name) {
                let mut known: Vec<&str> = set.flavors.keys().map(String::as_str).collect();
                known.sort_unstable();
                return Err(ToolError::InvalidArgument(format!(
                    "unknown flavor {name:?}; expected one of {}",
                    known.join(", ")
                )));
            }
        }
        Ok(())
    }
}

async fn load_set(dir: &Path) -> Result<StrategySet, ToolError> {
    Ok(StrategySet {
        grand_strategies: load_json(dir, "grand-strategy.json").await?,
        flavors: load_json(dir, "flavors.json").await?,
        military: load_json(dir, "military.json").await?,
        economic: load_json(dir, "economic.json").await?,
        event_categories: load_json(dir, "event-categories.json").await?,
    })
}

async fn load_json<T: serde::de::DeserializeOwned>(
    dir: &Path,
    file: &str,
) -> Result<T, ToolError> {
    let path = dir.join(file);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ToolError::DependencyFailed(format!("{}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ToolError::DependencyFailed(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| {
            std::fs::write(dir.path().join(name), body).unwrap();
        };
        write(
            "grand-strategy.json",
            r#"{"Conquest": "Win by capturing capitals", "Culture": "Win by tourism"}"#,
        );
        write(
            "flavors.json",
            r#"{"Offense": "Attack readiness", "Growth": "City growth"}"#,
        );
        write("military.json", r#"[{"name": "Fortify the border"}]"#);
        write("economic.json", r#"[{"name": "Trade route spam"}]"#);
        write(
            "event-categories.json",
            r#"{"WarDeclared": ["Military", "Diplomacy"], "CityFounded": ["Economy"]}"#,
        );
        dir
    }

    #[tokio::test]
    async fn loads_all_files() {
        let dir = fixture_dir().await;
        let catalog = StrategyCatalog::new(StrategyFiles {
            dir: dir.path().to_path_buf(),
        });
        let set = catalog.get().await.unwrap();
        assert_eq!(set.grand_strategies.len(), 2);
        assert_eq!(set.military.len(), 1);
        assert_eq!(set.categories_for("WarDeclared"), ["Military", "Diplomacy"]);
        assert!(set.categories_for("UnknownEvent").is_empty());
    }

    #[tokio::test]
    async fn cache_is_reused_within_ttl() {
        let dir = fixture_dir().await;
        let catalog = StrategyCatalog::new(StrategyFiles {
            dir: dir.path().to_path_buf(),
        });
        let first = catalog.get().await.unwrap();
        // Even after deleting the files the cached snapshot serves.
        std::fs::remove_file(dir.path().join("flavors.json")).unwrap();
        let second = catalog.get().await.unwrap();
        assert_eq!(first.flavors.len(), second.flavors.len());
    }

    #[tokio::test]
    async fn validation_rejects_unknown_names() {
        let dir = fixture_dir().await;
        let catalog = StrategyCatalog::new(StrategyFiles {
            dir: dir.path().to_path_buf(),
        });
        assert!(catalog.validate_grand_strategy("Conquest").await.is_ok());
        let err = catalog
            .validate_grand_strategy("Tourism")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));

        let mut weights = serde_json::Map::new();
        weights.insert("Offense".into(), serde_json::json!(7));
        assert!(catalog.validate_flavors(&weights).await.is_ok());
        weights.insert("Bananas".into(), serde_json::json!(2));
        assert!(catalog.validate_flavors(&weights).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_a_dependency_failure() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StrategyCatalog::new(StrategyFiles {
            dir: dir.path().to_path_buf(),
        });
        assert!(matches!(
            catalog.get().await,
            Err(ToolError::DependencyFailed(_))
        ));
    }
}
