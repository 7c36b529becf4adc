//! Error types for precache
//!
//! All modules use `PrecacheResult<T>` as their return type. Transport-level
//! failures have their own `FetchError` so the routing path can surface them
//! to the caller unchanged.

use crate::controller::LifecycleState;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for precache operations
pub type PrecacheResult<T> = Result<T, PrecacheError>;

/// Network failures (no response was produced at all)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("unsupported request method: {0}")]
    UnsupportedMethod(String),

    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

/// All errors that can occur in precache
#[derive(Error, Debug)]
pub enum PrecacheError {
    // Manifest errors
    #[error("Manifest is empty; at least one resource must be listed")]
    EmptyManifest,

    #[error("Manifest lists {0} more than once")]
    DuplicateManifestEntry(String),

    #[error("Invalid resource identifier {id:?}: {reason}")]
    InvalidResource { id: String, reason: String },

    #[error("Invalid generation name {name:?}: {reason}")]
    InvalidGeneration { name: String, reason: String },

    // Provisioning errors
    #[error("Failed to fetch {resource} while installing: {source}")]
    ProvisionFetch {
        resource: String,
        #[source]
        source: FetchError,
    },

    #[error("Fetching {resource} while installing returned HTTP {status}")]
    ProvisionStatus { resource: String, status: u16 },

    // Routing errors
    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    // Store errors
    #[error("Cache store {store} unavailable: {reason}")]
    StoreUnavailable { store: String, reason: String },

    #[error("Generation not found: {0}")]
    GenerationNotFound(String),

    // Lifecycle errors
    #[error("Invalid lifecycle transition for {generation}: {from} -> {to}")]
    InvalidTransition {
        generation: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("No generation is waiting to activate")]
    NothingToActivate,

    #[error("Generation {0} is already active")]
    AlreadyActive(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrecacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a store-unavailable error from any displayable cause
    pub fn store(store: impl Into<String>, reason: impl ToString) -> Self {
        Self::StoreUnavailable {
            store: store.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if the host can expect a later attempt to succeed.
    ///
    /// Nothing is retried internally; this only informs the host's messaging.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProvisionFetch { .. } | Self::ProvisionStatus { .. } | Self::Network(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ProvisionFetch { .. } => {
                Some("Check that the origin is reachable, then run: precache install")
            }
            Self::ProvisionStatus { .. } => {
                Some("Every manifest entry must be served with a 2xx status")
            }
            Self::NothingToActivate => Some("Run: precache install --no-activate first"),
            Self::AlreadyActive(_) => Some("Bump controller.generation to publish a new cache"),
            Self::EmptyManifest => Some("Add entries to controller.manifest in the config file"),
            Self::StoreUnavailable { .. } => Some("Check free disk space and storage.root"),
            _ => None,
        }
    }
}
