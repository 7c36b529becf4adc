//! Offline cache controller
//!
//! Owns the lifecycle of cache generations: install (provision a manifest
//! into a fresh generation), activate (make it answer requests), and route
//! (cache first, network on miss).
//!
//! Only one generation is active at a time. Activating a newer generation
//! supersedes the previous one; its store is left on disk unless stale
//! generation pruning is enabled.

pub mod provisioner;
pub mod router;
pub mod state;

pub use provisioner::{ProvisionReport, Provisioner};
pub use router::{Routed, Router, Source};
pub use state::{ControllerSnapshot, GenerationLifecycle, LifecycleState};

use crate::cache::{CacheStorage, GenerationId};
use crate::error::{PrecacheError, PrecacheResult};
use crate::manifest::Manifest;
use crate::network::{Fetcher, Request};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The entry points a host environment calls into
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Install-time hook: provision `generation` from `manifest`
    async fn on_install(
        &mut self,
        generation: GenerationId,
        manifest: &Manifest,
    ) -> PrecacheResult<ProvisionReport>;

    /// Promote the installed generation to active
    async fn on_activate(&mut self) -> PrecacheResult<Activation>;

    /// Per-request hook: answer one intercepted request
    async fn on_fetch(&self, request: &Request) -> PrecacheResult<Routed>;
}

/// Tunables the host passes in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Upper bound on concurrent fetches during provisioning
    pub max_concurrent_fetches: usize,
    /// Delete every other stored generation when a new one activates
    pub prune_stale_generations: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            prune_stale_generations: false,
        }
    }
}

/// Result of an activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub activated: GenerationId,
    pub superseded: Option<GenerationId>,
    pub pruned: Vec<GenerationId>,
}

/// Single controller instance per origin
pub struct Controller {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    options: ControllerOptions,
    snapshot: ControllerSnapshot,
    router: Router,
}

impl Controller {
    /// A freshly registered controller with nothing installed
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            router: Router::passthrough(fetcher.clone()),
            storage,
            fetcher,
            options,
            snapshot: ControllerSnapshot::new(),
        }
    }

    /// Rebuild a controller from a persisted snapshot.
    ///
    /// Fails if the snapshot names an active generation whose store is gone.
    pub async fn restore(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        options: ControllerOptions,
        snapshot: ControllerSnapshot,
    ) -> PrecacheResult<Self> {
        let router = match &snapshot.active {
            Some(active) if !active.state.is_serving() => {
                return Err(PrecacheError::store(
                    active.generation.as_str(),
                    format!("recorded as active but in state {}", active.state),
                ));
            }
            Some(active) => {
                let store = storage.get(&active.generation).await?.ok_or_else(|| {
                    PrecacheError::store(active.generation.as_str(), "active store is missing")
                })?;
                Router::new(store, fetcher.clone())
            }
            None => Router::passthrough(fetcher.clone()),
        };

        debug!(
            "Restored controller {} (active: {:?})",
            snapshot.registration_id,
            snapshot.active.as_ref().map(|a| a.generation.as_str())
        );

        Ok(Self {
            storage,
            fetcher,
            options,
            snapshot,
            router,
        })
    }

    /// Persistable view of the lifecycle
    pub fn snapshot(&self) -> &ControllerSnapshot {
        &self.snapshot
    }

    /// Generation currently answering requests
    pub fn active_generation(&self) -> Option<&GenerationId> {
        self.snapshot.active.as_ref().map(|a| &a.generation)
    }

    /// Generation installing, waiting, or failed
    pub fn pending(&self) -> Option<&GenerationLifecycle> {
        self.snapshot.pending.as_ref()
    }

    /// Retire whatever sits in the pending slot before a new install
    fn retire_pending(&mut self, next: &GenerationId) -> PrecacheResult<GenerationLifecycle> {
        match self.snapshot.pending.take() {
            Some(p) if &p.generation == next && p.state == LifecycleState::InstallFailed => Ok(p),
            Some(mut p) => {
                if p.state == LifecycleState::WaitingToActivate && &p.generation != next {
                    p.transition(LifecycleState::Superseded)?;
                    info!("Waiting generation {} superseded by {}", p.generation, next);
                    self.snapshot.superseded.push(p.generation);
                } else {
                    debug!("Discarding pending {} ({})", p.generation, p.state);
                }
                Ok(GenerationLifecycle::new(next.clone()))
            }
            None => Ok(GenerationLifecycle::new(next.clone())),
        }
    }

    /// Install `generation`: Installing, then WaitingToActivate or InstallFailed.
    ///
    /// Dropping the returned future mid-way leaves the generation `Installing`,
    /// which can never be activated.
    pub async fn install(
        &mut self,
        generation: GenerationId,
        manifest: &Manifest,
    ) -> PrecacheResult<ProvisionReport> {
        if self.active_generation() == Some(&generation) {
            return Err(PrecacheError::AlreadyActive(generation.to_string()));
        }

        let mut lifecycle = self.retire_pending(&generation)?;
        lifecycle.transition(LifecycleState::Installing)?;
        // A superseded name coming back is a new lifecycle, not a superseded one
        self.snapshot.superseded.retain(|g| g != &generation);
        self.snapshot.pending = Some(lifecycle);
        info!("Installing generation {}", generation);

        let result = Provisioner::new(
            self.storage.as_ref(),
            self.fetcher.as_ref(),
            self.options.max_concurrent_fetches,
        )
        .provision(&generation, manifest)
        .await;

        let pending = self
            .snapshot
            .pending
            .as_mut()
            .ok_or_else(|| PrecacheError::Internal("pending generation vanished".to_string()))?;

        match result {
            Ok(report) => {
                pending.transition(LifecycleState::WaitingToActivate)?;
                info!("Generation {} installed, waiting to activate", generation);
                Ok(report)
            }
            Err(e) => {
                pending.fail(e.to_string())?;
                warn!("Install of {} failed: {}", generation, e);
                Err(e)
            }
        }
    }

    /// Activate the waiting generation, superseding the current one
    pub async fn activate(&mut self) -> PrecacheResult<Activation> {
        let pending = self
            .snapshot
            .pending
            .as_ref()
            .ok_or(PrecacheError::NothingToActivate)?;

        if !pending.state.can_transition_to(LifecycleState::Active) {
            return Err(PrecacheError::InvalidTransition {
                generation: pending.generation.to_string(),
                from: pending.state,
                to: LifecycleState::Active,
            });
        }

        let store = self
            .storage
            .get(&pending.generation)
            .await?
            .ok_or_else(|| PrecacheError::GenerationNotFound(pending.generation.to_string()))?;
        let info = store.info().await?;
        if !info.state.is_activatable() {
            return Err(PrecacheError::store(
                pending.generation.as_str(),
                format!("generation is {}, not complete", info.state),
            ));
        }

        let mut next = self
            .snapshot
            .pending
            .take()
            .ok_or(PrecacheError::NothingToActivate)?;
        next.transition(LifecycleState::Active)?;
        let activated = next.generation.clone();

        let superseded = match self.snapshot.active.take() {
            Some(mut previous) => {
                previous.transition(LifecycleState::Superseded)?;
                info!("Generation {} superseded", previous.generation);
                self.snapshot.superseded.push(previous.generation.clone());
                Some(previous.generation)
            }
            None => None,
        };

        self.snapshot.active = Some(next);
        self.router = Router::new(store, self.fetcher.clone());
        info!("Generation {} active", activated);

        let pruned = if self.options.prune_stale_generations {
            self.prune_after_activation().await
        } else {
            vec![]
        };

        Ok(Activation {
            activated,
            superseded,
            pruned,
        })
    }

    /// Stored generations that are neither active nor pending
    pub async fn stale_generations(&self) -> PrecacheResult<Vec<GenerationId>> {
        let keep: Vec<&GenerationId> = self
            .snapshot
            .active
            .iter()
            .chain(self.snapshot.pending.iter())
            .map(|l| &l.generation)
            .collect();

        Ok(self
            .storage
            .list()
            .await?
            .into_iter()
            .map(|info| info.id)
            .filter(|id| !keep.contains(&id))
            .collect())
    }

    /// Delete one stored generation and forget it in the snapshot
    async fn delete_generation(&mut self, generation: &GenerationId) -> PrecacheResult<bool> {
        let deleted = self.storage.delete(generation).await?;
        if deleted {
            info!("Pruned generation {}", generation);
        }
        self.snapshot.superseded.retain(|g| g != generation);
        Ok(deleted)
    }

    /// Delete every stale generation.
    ///
    /// Stops at the first failed deletion; generations deleted before it are
    /// already dropped from the snapshot.
    pub async fn prune(&mut self) -> PrecacheResult<Vec<GenerationId>> {
        let stale = self.stale_generations().await?;
        let mut pruned = Vec::with_capacity(stale.len());

        for generation in stale {
            if self.delete_generation(&generation).await? {
                pruned.push(generation);
            }
        }

        Ok(pruned)
    }

    /// Best-effort prune once a new generation is active.
    ///
    /// The activation is already committed, so failures are logged and skipped.
    async fn prune_after_activation(&mut self) -> Vec<GenerationId> {
        let stale = match self.stale_generations().await {
            Ok(stale) => stale,
            Err(e) => {
                warn!("Skipping prune after activation: {}", e);
                return vec![];
            }
        };

        let mut pruned = Vec::with_capacity(stale.len());
        for generation in stale {
            match self.delete_generation(&generation).await {
                Ok(true) => pruned.push(generation),
                Ok(false) => {}
                Err(e) => warn!("Failed to prune generation {}: {}", generation, e),
            }
        }
        pruned
    }

    /// Answer one request. Read-only and safe to call concurrently.
    pub async fn route(&self, request: &Request) -> PrecacheResult<Routed> {
        self.router.route(request).await
    }
}

#[async_trait]
impl LifecycleHooks for Controller {
    async fn on_install(
        &mut self,
        generation: GenerationId,
        manifest: &Manifest,
    ) -> PrecacheResult<ProvisionReport> {
        self.install(generation, manifest).await
    }

    async fn on_activate(&mut self) -> PrecacheResult<Activation> {
        self.activate().await
    }

    async fn on_fetch(&self, request: &Request) -> PrecacheResult<Routed> {
        self.route(request).await
    }
}
