//! Config loading and persistence.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub collections: CollectionNames,
    pub limits: Limits,
}

/// Remote collection names, overridable for stores with different schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionNames {
    pub tasks: String,
    pub subtasks: String,
    pub messages: String,
    pub users: String,
    pub user_roles: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            tasks: "tasks".to_string(),
            subtasks: "subtasks".to_string(),
            messages: "messages".to_string(),
            users: "users".to_string(),
            user_roles: "user_roles".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Cap on sub-items held for parents that have not arrived; the oldest
    /// pending parent is evicted past this.
    pub max_orphan_subtasks: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_orphan_subtasks: 256,
        }
    }
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError {
        reason: format!("failed to parse {}: {e}", path.display()),
    })
}

pub fn load_or_default(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }
    match load(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("config load failed, using defaults: {e}");
            Config::default()
        }
    }
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| ConfigError {
            reason: format!("failed to create {}: {e}", dir.display()),
        })?;
    }
    let contents = toml::to_string_pretty(cfg).map_err(|e| ConfigError {
        reason: format!("failed to render config: {e}"),
    })?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let dir = path.parent().ok_or_else(|| ConfigError {
        reason: "config path missing parent directory".to_string(),
    })?;
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ConfigError {
        reason: format!("failed to create temp file in {}: {e}", dir.display()),
    })?;
    fs::write(temp.path(), data).map_err(|e| ConfigError {
        reason: format!("failed to write config temp file: {e}"),
    })?;
    temp.persist(path).map_err(|e| ConfigError {
        reason: format!("failed to persist config to {}: {e}", path.display()),
    })?;
    Ok(())
}
