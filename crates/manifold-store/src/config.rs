//! Gateway configuration: `manifold.toml` in the data directory, then
//! environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::{Deserialize, Serialize};

use crate::backend::Metric;
use crate::error::{Result, StoreError};

pub const CONFIG_FILE: &str = "manifold.toml";
pub const DATABASE_FILE: &str = "patterns.db";

pub const ENV_DATA_DIR: &str = "MANIFOLD_DATA_DIR";
pub const ENV_COLLECTION: &str = "MANIFOLD_COLLECTION";
pub const ENV_TIMEOUT_MS: &str = "MANIFOLD_TIMEOUT_MS";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub collection: String,
    /// Upper bound on every backend call.
    pub call_timeout_ms: u64,
    pub index_nlist: u32,
    pub search_nprobe: u32,
    pub metric: Metric,
    pub default_top_k: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            collection: "quantum_patterns".to_string(),
            call_timeout_ms: 5000,
            index_nlist: 1024,
            search_nprobe: 10,
            metric: Metric::L2,
            default_top_k: 5,
        }
    }
}

impl GatewayConfig {
    /// Read `<data_dir>/manifold.toml` if present, then apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(collection) = lookup(ENV_COLLECTION) {
            self.collection = collection;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.call_timeout_ms = raw.trim().parse().map_err(|_| {
                StoreError::Config(format!("{ENV_TIMEOUT_MS} must be an integer, got '{raw}'"))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            return Err(StoreError::Config("collection name is empty".to_string()));
        }
        if self.call_timeout_ms == 0 {
            return Err(StoreError::Config("call_timeout_ms must be positive".to_string()));
        }
        if self.default_top_k == 0 {
            return Err(StoreError::Config("default_top_k must be positive".to_string()));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// `$MANIFOLD_DATA_DIR`, or `~/.manifold`.
pub fn default_data_dir() -> PathBuf {
    env::var(ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".manifold"))
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}
