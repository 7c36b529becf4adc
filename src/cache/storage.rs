//! Cache storage abstraction
//!
//! `CacheStorage` is the set of named stores; `CacheStore` is one
//! generation's mapping from request identity to stored response.

use crate::cache::generation::{GenerationId, GenerationInfo};
use crate::error::PrecacheResult;
use crate::manifest::ResourceId;
use crate::network::Response;
use async_trait::async_trait;
use std::sync::Arc;

/// One generation's store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The generation this store belongs to
    fn generation(&self) -> &GenerationId;

    /// Replace the whole contents with `entries` and mark the generation complete.
    ///
    /// Either every entry becomes visible or none does.
    async fn put_all(&self, entries: Vec<(ResourceId, Response)>) -> PrecacheResult<()>;

    /// Stored response for `id`, if any
    async fn lookup(&self, id: &ResourceId) -> PrecacheResult<Option<Response>>;

    /// Stored identifiers in commit order
    async fn keys(&self) -> PrecacheResult<Vec<ResourceId>>;

    /// State and size summary
    async fn info(&self) -> PrecacheResult<GenerationInfo>;
}

/// The durable set of named stores
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the store for `generation`, creating an empty one if absent
    async fn open(&self, generation: &GenerationId) -> PrecacheResult<Arc<dyn CacheStore>>;

    /// Open an existing store without creating it
    async fn get(&self, generation: &GenerationId) -> PrecacheResult<Option<Arc<dyn CacheStore>>>;

    /// All stored generations, oldest first
    async fn list(&self) -> PrecacheResult<Vec<GenerationInfo>>;

    /// Remove a generation; returns whether it existed
    async fn delete(&self, generation: &GenerationId) -> PrecacheResult<bool>;
}
