//! Resource identifiers and the install-time manifest
//!
//! A `ResourceId` is the request identity used as the cache key. The same
//! resource can be spelled several ways by the hosted page (`./index.html`,
//! `index.html`, `http://origin/index.html`), so identifiers are normalized
//! once on the way in and compared as plain strings afterwards.

use crate::error::{PrecacheError, PrecacheResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Normalized request identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Parse an identifier with no origin to reduce against
    pub fn parse(raw: &str) -> PrecacheResult<Self> {
        Self::resolve(raw, None)
    }

    /// Parse an identifier, reducing absolute URLs on `origin` to their path
    pub fn resolve(raw: &str, origin: Option<&str>) -> PrecacheResult<Self> {
        let trimmed = raw.trim();
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(PrecacheError::InvalidResource {
                id: raw.to_string(),
                reason: "contains whitespace or control characters".to_string(),
            });
        }

        // Fragments never reach the network
        let without_fragment = trimmed.split('#').next().unwrap_or_default();

        if is_absolute_url(without_fragment) {
            if let Some(rest) = origin.and_then(|o| strip_origin(without_fragment, o)) {
                return Ok(Self(normalize_path(rest)));
            }
            return Ok(Self(without_fragment.to_string()));
        }

        if without_fragment.contains("://") {
            return Err(PrecacheError::InvalidResource {
                id: raw.to_string(),
                reason: "only http and https URLs are supported".to_string(),
            });
        }

        Ok(Self(normalize_path(without_fragment)))
    }

    /// The normalized identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier points outside the configured origin
    pub fn is_absolute(&self) -> bool {
        is_absolute_url(&self.0)
    }

    /// Full URL for this identifier against `origin`
    pub fn url(&self, origin: &str) -> String {
        if self.is_absolute() {
            self.0.clone()
        } else {
            format!("{}{}", origin.trim_end_matches('/'), self.0)
        }
    }
}

fn is_absolute_url(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Return the part of `url` after `origin`, if `url` lives on that origin
fn strip_origin<'a>(url: &'a str, origin: &str) -> Option<&'a str> {
    let origin = origin.trim_end_matches('/');
    let rest = url.strip_prefix(origin)?;
    if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') {
        Some(rest)
    } else {
        None
    }
}

/// `./a`, `a` and `/a` all become `/a`; the empty path becomes `/`
fn normalize_path(raw: &str) -> String {
    let mut path = raw;
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    if path == "." {
        path = "";
    }
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = PrecacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

/// Ordered, non-empty list of resources to provision at install time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ResourceId>,
}

impl Manifest {
    /// Build a manifest, rejecting empty lists and duplicate identifiers
    pub fn new(entries: Vec<ResourceId>) -> PrecacheResult<Self> {
        if entries.is_empty() {
            return Err(PrecacheError::EmptyManifest);
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for id in &entries {
            if !seen.insert(id) {
                return Err(PrecacheError::DuplicateManifestEntry(id.to_string()));
            }
        }

        debug!("Manifest has {} entries", entries.len());
        Ok(Self { entries })
    }

    /// Parse raw configured paths against an origin
    pub fn parse<S: AsRef<str>>(raw: &[S], origin: Option<&str>) -> PrecacheResult<Self> {
        let entries = raw
            .iter()
            .map(|s| ResourceId::resolve(s.as_ref(), origin))
            .collect::<PrecacheResult<Vec<_>>>()?;
        Self::new(entries)
    }

    /// Entries in declaration order
    pub fn entries(&self) -> &[ResourceId] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
