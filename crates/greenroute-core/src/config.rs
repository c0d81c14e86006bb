use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEBOUNCE_MS: u64 = 1_500; // quiet window before a route-table flush
pub const DEFAULT_SYNC_CHANNEL_CAPACITY: usize = 64;

/// Top-level config (greenroute.toml + GREENROUTE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GreenrouteConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Route-table synchronizer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Mutations arriving within this window coalesce into one flush.
    /// Override with env var: GREENROUTE_SYNC__DEBOUNCE_MS=500
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Capacity of the snapshot channel feeding the flush task.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            channel_capacity: DEFAULT_SYNC_CHANNEL_CAPACITY,
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
fn default_channel_capacity() -> usize {
    DEFAULT_SYNC_CHANNEL_CAPACITY
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.greenroute/greenroute.db", home)
}

impl GreenrouteConfig {
    /// Load config from a TOML file with GREENROUTE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. GREENROUTE_CONFIG env var
    ///   3. ~/.greenroute/greenroute.toml
    ///
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("GREENROUTE_CONFIG").ok())
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::GreenrouteError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("GREENROUTE_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.greenroute/greenroute.toml", home)
}
