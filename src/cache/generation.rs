//! Generation identity and state
//!
//! A generation is one immutable version of the cache store. Its name is
//! used verbatim as a directory name by the disk backend, so it is
//! validated up front.

use crate::error::{PrecacheError, PrecacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_GENERATION_LEN: usize = 128;

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Opaque, validated name of one cache generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenerationId(String);

impl GenerationId {
    pub fn new(name: impl Into<String>) -> PrecacheResult<Self> {
        let name = name.into();
        let invalid = |reason: &str| PrecacheError::InvalidGeneration {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if name.len() > MAX_GENERATION_LEN {
            return Err(invalid("longer than 128 characters"));
        }
        if name.starts_with('.') {
            return Err(invalid("must not start with '.'"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(invalid("only ASCII letters, digits, '.', '_' and '-' are allowed"));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GenerationId {
    type Error = PrecacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GenerationId> for String {
    fn from(id: GenerationId) -> Self {
        id.0
    }
}

/// Storage-level state of a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    /// Opened but never committed, or left behind by an abandoned install
    Building,
    /// A full manifest was committed; immutable from here on
    Complete,
}

impl GenerationState {
    /// Only complete generations may be activated
    pub fn is_activatable(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Summary of one stored generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInfo {
    /// Generation name
    pub id: GenerationId,
    /// Current storage state
    pub state: GenerationState,
    /// When the store was first opened
    pub created_at: DateTime<Utc>,
    /// When the last full manifest was committed
    pub committed_at: Option<DateTime<Utc>>,
    /// Number of stored responses
    pub entry_count: usize,
    /// Total body bytes
    pub size_bytes: u64,
}

impl GenerationInfo {
    /// A freshly opened, empty generation
    pub fn building(id: GenerationId) -> Self {
        Self {
            id,
            state: GenerationState::Building,
            created_at: Utc::now(),
            committed_at: None,
            entry_count: 0,
            size_bytes: 0,
        }
    }
}
