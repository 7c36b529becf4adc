//! Install-time provisioning
//!
//! Fetches every manifest entry and commits the lot to the generation's
//! store in a single `put_all`. Any failed fetch or non-2xx status aborts the
//! whole attempt before anything is written.

use crate::cache::{CacheStorage, GenerationId};
use crate::error::{PrecacheError, PrecacheResult};
use crate::manifest::{Manifest, ResourceId};
use crate::network::{Fetcher, Request, Response};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

/// Outcome of a successful provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub generation: GenerationId,
    pub entries: usize,
    pub bytes: u64,
}

/// Populates one generation from a manifest
pub struct Provisioner<'a> {
    storage: &'a dyn CacheStorage,
    fetcher: &'a dyn Fetcher,
    max_concurrent_fetches: usize,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        storage: &'a dyn CacheStorage,
        fetcher: &'a dyn Fetcher,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            storage,
            fetcher,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Fetch one manifest entry, treating non-2xx as failure
    async fn fetch_entry(&self, id: ResourceId) -> PrecacheResult<(ResourceId, Response)> {
        let response = self
            .fetcher
            .fetch(&Request::get(id.clone()))
            .await
            .map_err(|source| PrecacheError::ProvisionFetch {
                resource: id.to_string(),
                source,
            })?;

        if !response.is_success() {
            return Err(PrecacheError::ProvisionStatus {
                resource: id.to_string(),
                status: response.status,
            });
        }

        debug!("Fetched {} ({} bytes)", id, response.body.len());
        Ok((id, response))
    }

    /// Open (or create) the store for `generation` and populate it from `manifest`.
    ///
    /// Re-running for the same generation re-fetches everything and replaces
    /// the previous contents.
    pub async fn provision(
        &self,
        generation: &GenerationId,
        manifest: &Manifest,
    ) -> PrecacheResult<ProvisionReport> {
        let store = self.storage.open(generation).await?;

        info!(
            "Provisioning {} with {} resources",
            generation,
            manifest.len()
        );

        let fetched: Vec<(ResourceId, Response)> = stream::iter(manifest.entries().iter().cloned())
            .map(|id| self.fetch_entry(id))
            .buffered(self.max_concurrent_fetches)
            .try_collect()
            .await?;

        let bytes: u64 = fetched.iter().map(|(_, r)| r.body.len() as u64).sum();
        let entries = fetched.len();
        store.put_all(fetched).await?;

        info!("Provisioned {}: {} resources", generation, entries);
        Ok(ProvisionReport {
            generation: generation.clone(),
            entries,
            bytes,
        })
    }
}
