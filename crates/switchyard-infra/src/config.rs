//! Configuration loader for Switchyard.
//!
//! Reads `switchyard.toml` from the data directory (`~/.switchyard/` in
//! production) or an explicit path, and deserializes it into an
//! [`OrchestratorConfig`] plus the optional `[simulation.<provider>]`
//! profiles used by the simulated backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use switchyard_types::config::OrchestratorConfig;
use switchyard_types::error::ConfigError;

use crate::simulated::SimulationProfile;

pub const CONFIG_FILE_NAME: &str = "switchyard.toml";
pub const DATABASE_FILE_NAME: &str = "switchyard.db";

/// Everything read from one configuration file.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub orchestrator: OrchestratorConfig,
    pub simulation: BTreeMap<String, SimulationProfile>,
    /// File the config came from; `None` when defaults were used.
    pub source: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SimulationSection {
    #[serde(default)]
    simulation: BTreeMap<String, SimulationProfile>,
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `SWITCHYARD_DATA_DIR` environment variable
/// 2. `~/.switchyard`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SWITCHYARD_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".switchyard");
    }

    PathBuf::from(".switchyard")
}

/// `{data_dir}/switchyard.toml`
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<LoadedConfig, ConfigError> {
    let orchestrator: OrchestratorConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    orchestrator.validate()?;

    let section: SimulationSection =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    for name in section.simulation.keys() {
        if orchestrator.provider(name).is_none() {
            tracing::warn!(provider = %name, "simulation profile for unconfigured provider ignored");
        }
    }

    Ok(LoadedConfig {
        orchestrator,
        simulation: section.simulation,
        source: None,
    })
}

/// Load configuration from `path`.
///
/// - If the file does not exist, returns defaults (no providers, no routes).
/// - If the file exists but fails to read, parse or validate, returns the error.
pub async fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return Ok(LoadedConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };

    let mut loaded = parse_config(&content)?;
    loaded.source = Some(path.to_path_buf());
    tracing::info!(
        path = %path.display(),
        providers = loaded.orchestrator.providers.len(),
        routes = loaded.orchestrator.routing.len(),
        "configuration loaded"
    );
    Ok(loaded)
}
