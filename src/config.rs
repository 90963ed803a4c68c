use crate::constants::{DEFAULT_USER_AGENT, REDFIN_GIS_CSV_URL};
use crate::error::{Result, TrendsError};
use crate::query::QueryConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub query: QueryConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: REDFIN_GIS_CSV_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub write_charts: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            write_charts: true,
        }
    }
}

impl Config {
    /// Load the TOML config at `path`, falling back to defaults when the file is absent,
    /// then apply `PPSF_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                TrendsError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml(&content)?
        } else {
            warn!(
                "Config file '{}' not found, using built-in defaults",
                path.display()
            );
            Self::default()
        };
        config.apply_env_overrides();
        config.query.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = non_empty_env("PPSF_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(url) = non_empty_env("PPSF_SOURCE_URL") {
            self.source.base_url = url;
        }
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}
