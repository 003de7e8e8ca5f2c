//! Engine configuration
//!
//! Every tunable of the engine lives in [`EngineConfig`]. Descriptors may
//! override the timing values per scenario through their `options` block.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use action_primitives::KeyboardLayout;

/// Cleanup never gets less than this, whatever the configuration says.
pub const MIN_CLEANUP_RESERVE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between two predicate invocations
    pub poll_interval_ms: u64,

    /// Budget of a finder wait when a step does not name one
    pub wait_timeout_ms: u64,

    /// Time kept back from the harness deadline for cleanup
    pub cleanup_reserve_ms: u64,

    /// How long to wait for histograms after the recorded action
    pub metric_wait_ms: u64,

    /// Where failure screenshots and tree dumps go
    pub artifact_dir: PathBuf,

    /// Where `results-chart.json` files go
    pub results_dir: PathBuf,

    pub keyboard_layout: KeyboardLayout,

    /// Duration of mode-dependent swipes and drags
    pub swipe_duration_ms: u64,

    pub long_press_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            wait_timeout_ms: 15_000,
            cleanup_reserve_ms: 10_000,
            metric_wait_ms: 1_000,
            artifact_dir: PathBuf::from("artifacts"),
            results_dir: PathBuf::from("results"),
            keyboard_layout: KeyboardLayout::default(),
            swipe_duration_ms: 300,
            long_press_ms: 1_000,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Clamped to at least [`MIN_CLEANUP_RESERVE`].
    pub fn cleanup_reserve(&self) -> Duration {
        Duration::from_millis(self.cleanup_reserve_ms).max(MIN_CLEANUP_RESERVE)
    }

    pub fn metric_wait(&self) -> Duration {
        Duration::from_millis(self.metric_wait_ms)
    }

    pub fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.swipe_duration_ms)
    }

    pub fn long_press(&self) -> Duration {
        Duration::from_millis(self.long_press_ms)
    }
}

/// Candidate locations, most specific first.
pub fn config_search_path(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
        return paths;
    }
    paths.push(PathBuf::from("config").join("uase.yaml"));
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("uase");
        dir.push("config.yaml");
        paths.push(dir);
    }
    paths
}

/// Loads the first configuration file found, falling back to defaults.
///
/// An explicit path that does not exist is an error; a missing default
/// location is not.
pub async fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    for path in config_search_path(explicit) {
        if !path.exists() {
            if explicit.is_some() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            continue;
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: EngineConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from: {}", path.display());
        return Ok(config);
    }

    warn!("Config file not found, using defaults");
    Ok(EngineConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::TopRowLayout;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str(
            "poll_interval_ms: 50\nkeyboard_layout:\n  top_row: action_keys\n",
        )
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.wait_timeout(), Duration::from_secs(15));
        assert_eq!(config.keyboard_layout.top_row, TopRowLayout::ActionKeys);
    }

    #[test]
    fn cleanup_reserve_has_a_floor() {
        let config = EngineConfig {
            cleanup_reserve_ms: 1_000,
            ..EngineConfig::default()
        };
        assert_eq!(config.cleanup_reserve(), MIN_CLEANUP_RESERVE);
        assert_eq!(EngineConfig::default().cleanup_reserve(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uase.yaml");
        std::fs::write(&path, "wait_timeout_ms: 2000\nartifact_dir: /tmp/uase\n").unwrap();
        let config = load_config(Some(&path)).await.unwrap();
        assert_eq!(config.wait_timeout(), Duration::from_secs(2));
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/uase"));

        assert!(load_config(Some(&dir.path().join("missing.yaml"))).await.is_err());
    }
}
