use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use fieldline_engine::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("fieldline.db")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            engine: EngineConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Read `path`, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.engine.validate()?;
        Ok(config)
    }
}
