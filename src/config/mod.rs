//! Configuration management for precache

pub mod schema;

pub use schema::Config;

use crate::cache::GenerationId;
use crate::controller::ControllerOptions;
use crate::error::{PrecacheError, PrecacheResult};
use crate::manifest::Manifest;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("precache")
            .join("config.toml")
    }

    /// Get the default storage root
    pub fn default_storage_root() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("precache")
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> PrecacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> PrecacheResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            PrecacheError::io(format!("reading config from {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| PrecacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> PrecacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            PrecacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> PrecacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PrecacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Storage root: configured or the platform default
    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(ConfigManager::default_storage_root)
    }

    /// Where the controller registration is persisted
    pub fn controller_state_path(&self) -> PathBuf {
        self.storage_root().join("controller.json")
    }

    /// Where lifecycle audit events are appended
    pub fn audit_log_path(&self) -> PathBuf {
        self.storage_root().join("audit.log")
    }

    /// The configured generation, validated
    pub fn generation(&self) -> PrecacheResult<GenerationId> {
        GenerationId::new(self.controller.generation.clone())
    }

    /// The configured manifest, normalized against the origin
    pub fn manifest(&self) -> PrecacheResult<Manifest> {
        Manifest::parse(&self.controller.manifest, Some(&self.controller.origin))
    }

    /// Controller tunables
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            max_concurrent_fetches: self.network.max_concurrent_fetches,
            prune_stale_generations: self.controller.prune_stale_generations,
        }
    }
}
