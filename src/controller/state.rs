//! Controller lifecycle state and its persistence
//!
//! Lifecycle per generation:
//!
//! ```text
//! Unregistered -> Installing -> WaitingToActivate -> Active -> Superseded
//!                    |  ^              |
//!                    v  |              +-----------------------> Superseded
//!                InstallFailed
//! ```

use crate::cache::GenerationId;
use crate::error::{PrecacheError, PrecacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Lifecycle state of one controller generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Unregistered,
    Installing,
    InstallFailed,
    WaitingToActivate,
    Active,
    Superseded,
}

impl LifecycleState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unregistered, Installing)
                | (InstallFailed, Installing)
                | (Installing, WaitingToActivate)
                | (Installing, InstallFailed)
                | (WaitingToActivate, Active)
                | (WaitingToActivate, Superseded)
                | (Active, Superseded)
        )
    }

    /// Only an active generation answers intercepted requests
    pub fn is_serving(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unregistered => "unregistered",
            Self::Installing => "installing",
            Self::InstallFailed => "install-failed",
            Self::WaitingToActivate => "waiting-to-activate",
            Self::Active => "active",
            Self::Superseded => "superseded",
        };
        f.write_str(name)
    }
}

/// One generation's position in the lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationLifecycle {
    /// Generation this record tracks
    pub generation: GenerationId,

    /// Current state
    pub state: LifecycleState,

    /// When the state last changed
    pub updated_at: DateTime<Utc>,

    /// Reason for the last install failure
    pub last_error: Option<String>,
}

impl GenerationLifecycle {
    /// A generation the host has not registered yet
    pub fn new(generation: GenerationId) -> Self {
        Self {
            generation,
            state: LifecycleState::Unregistered,
            updated_at: Utc::now(),
            last_error: None,
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: LifecycleState) -> PrecacheResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(PrecacheError::InvalidTransition {
                generation: self.generation.to_string(),
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        self.updated_at = Utc::now();
        if next != LifecycleState::InstallFailed {
            self.last_error = None;
        }
        Ok(())
    }

    /// Record a failed install
    pub fn fail(&mut self, reason: impl Into<String>) -> PrecacheResult<()> {
        self.transition(LifecycleState::InstallFailed)?;
        self.last_error = Some(reason.into());
        Ok(())
    }
}

/// Serializable controller registration, persisted by the host between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    /// Stable id of this registration
    pub registration_id: Uuid,

    /// When the controller was first registered
    pub registered_at: DateTime<Utc>,

    /// Generation currently answering requests
    pub active: Option<GenerationLifecycle>,

    /// Generation installing, waiting, or failed
    pub pending: Option<GenerationLifecycle>,

    /// Generations replaced by a newer one, oldest first
    #[serde(default)]
    pub superseded: Vec<GenerationId>,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerSnapshot {
    /// A fresh registration with nothing installed
    pub fn new() -> Self {
        Self {
            registration_id: Uuid::new_v4(),
            registered_at: Utc::now(),
            active: None,
            pending: None,
            superseded: vec![],
        }
    }

    /// Load from `path`; `None` when no controller was registered yet
    pub async fn load(path: &Path) -> PrecacheResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            PrecacheError::io(format!("reading controller state {}", path.display()), e)
        })?;

        let snapshot: ControllerSnapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    /// Save to `path`
    pub async fn save(&self, path: &Path) -> PrecacheResult<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PrecacheError::io("creating state directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await.map_err(|e| {
            PrecacheError::io(format!("writing controller state {}", path.display()), e)
        })?;

        Ok(())
    }
}
