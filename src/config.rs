use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::storage::entities::{SessionType, TaskCategory};

pub const CONFIG_FILE: &str = "config.toml";

/// Settings read from `config.toml` in the application directory. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// How often a running timer publishes its elapsed time.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Used by `focus start` when no session type is given.
    #[serde(default = "default_session_type")]
    pub default_session_type: SessionType,

    /// Used by `focus start` and `task add` when no category is given.
    #[serde(default = "default_category")]
    pub default_category: TaskCategory,
}

fn default_refresh_interval() -> u64 {
    1
}

fn default_session_type() -> SessionType {
    SessionType::DeepWork
}

fn default_category() -> TaskCategory {
    TaskCategory::Building
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            default_session_type: default_session_type(),
            default_category: default_category(),
        }
    }
}

impl Config {
    /// Reads `config.toml` from `application_dir`, falling back to defaults when it's missing.
    pub fn load(application_dir: &Path) -> Result<Self> {
        let path = application_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file {path:?}"))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}
