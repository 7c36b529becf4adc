//! Configuration schema for precache
//!
//! Configuration is stored at `~/.config/precache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Controller generation and manifest
    pub controller: ControllerConfig,

    /// Network settings
    pub network: NetworkConfig,

    /// Storage settings
    pub storage: StorageConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging of lifecycle events
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Cache generation name; bump it to publish a new cache
    pub generation: String,

    /// Origin the manifest and intercepted requests resolve against
    pub origin: String,

    /// Resources provisioned at install time, in order
    pub manifest: Vec<String>,

    /// Delete every other generation when a new one activates
    pub prune_stale_generations: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            generation: "app-cache-v1".to_string(),
            origin: "http://127.0.0.1:8080".to_string(),
            manifest: vec![
                "./".to_string(),
                "./index.html".to_string(),
                "./app.js".to_string(),
                "./app_bg.wasm".to_string(),
            ],
            prune_stale_generations: false,
        }
    }
}

/// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum parallel fetches while provisioning
    pub max_concurrent_fetches: usize,

    /// Largest accepted response body in bytes
    pub max_body_bytes: u64,

    /// User-Agent sent when the request carries none
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_concurrent_fetches: 4,
            max_body_bytes: 256 * 1024 * 1024,
            user_agent: format!("precache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for generations, controller state and the audit log.
    /// Defaults to the platform data directory.
    pub root: Option<PathBuf>,
}
