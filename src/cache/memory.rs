//! In-memory cache storage
//!
//! Same semantics as the disk backend without durability. Used by tests and
//! by embedders that keep the controller alive for the whole session.

use crate::cache::generation::{GenerationId, GenerationInfo, GenerationState};
use crate::cache::storage::{CacheStorage, CacheStore};
use crate::error::PrecacheResult;
use crate::manifest::ResourceId;
use crate::network::Response;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct Contents {
    info: GenerationInfo,
    order: Vec<ResourceId>,
    entries: HashMap<ResourceId, Response>,
}

/// A single in-memory generation
pub struct MemoryStore {
    generation: GenerationId,
    contents: RwLock<Contents>,
}

impl MemoryStore {
    fn new(generation: GenerationId) -> Self {
        Self {
            contents: RwLock::new(Contents {
                info: GenerationInfo::building(generation.clone()),
                order: Vec::new(),
                entries: HashMap::new(),
            }),
            generation,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn generation(&self) -> &GenerationId {
        &self.generation
    }

    async fn put_all(&self, entries: Vec<(ResourceId, Response)>) -> PrecacheResult<()> {
        let order: Vec<ResourceId> = entries.iter().map(|(id, _)| id.clone()).collect();
        let size_bytes: u64 = entries.iter().map(|(_, r)| r.body.len() as u64).sum();
        let entries: HashMap<_, _> = entries.into_iter().collect();

        let mut contents = self.contents.write().await;
        contents.info.state = GenerationState::Complete;
        contents.info.committed_at = Some(Utc::now());
        contents.info.entry_count = entries.len();
        contents.info.size_bytes = size_bytes;
        contents.order = order;
        contents.entries = entries;
        Ok(())
    }

    async fn lookup(&self, id: &ResourceId) -> PrecacheResult<Option<Response>> {
        Ok(self.contents.read().await.entries.get(id).cloned())
    }

    async fn keys(&self) -> PrecacheResult<Vec<ResourceId>> {
        Ok(self.contents.read().await.order.clone())
    }

    async fn info(&self) -> PrecacheResult<GenerationInfo> {
        Ok(self.contents.read().await.info.clone())
    }
}

/// In-memory set of generations
#[derive(Default)]
pub struct MemoryStorage {
    stores: RwLock<HashMap<GenerationId, Arc<MemoryStore>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, generation: &GenerationId) -> PrecacheResult<Arc<dyn CacheStore>> {
        let mut stores = self.stores.write().await;
        let store = stores
            .entry(generation.clone())
            .or_insert_with(|| Arc::new(MemoryStore::new(generation.clone())))
            .clone();
        Ok(store as Arc<dyn CacheStore>)
    }

    async fn get(&self, generation: &GenerationId) -> PrecacheResult<Option<Arc<dyn CacheStore>>> {
        let stores = self.stores.read().await;
        Ok(stores
            .get(generation)
            .map(|s| s.clone() as Arc<dyn CacheStore>))
    }

    async fn list(&self) -> PrecacheResult<Vec<GenerationInfo>> {
        let stores: Vec<Arc<MemoryStore>> = self.stores.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(stores.len());
        for store in stores {
            infos.push(store.info().await?);
        }
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(infos)
    }

    async fn delete(&self, generation: &GenerationId) -> PrecacheResult<bool> {
        Ok(self.stores.write().await.remove(generation).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen(name: &str) -> GenerationId {
        GenerationId::new(name).unwrap()
    }

    fn id(path: &str) -> ResourceId {
        ResourceId::parse(path).unwrap()
    }

    #[tokio::test]
    async fn open_creates_building_store() {
        let storage = MemoryStorage::new();
        let store = storage.open(&gen("v1")).await.unwrap();

        let info = store.info().await.unwrap();
        assert_eq!(info.state, GenerationState::Building);
        assert_eq!(info.entry_count, 0);
        assert!(storage.get(&gen("v1")).await.unwrap().is_some());
        assert!(storage.get(&gen("v2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_all_replaces_contents() {
        let storage = MemoryStorage::new();
        let store = storage.open(&gen("v1")).await.unwrap();

        store
            .put_all(vec![
                (id("/a"), Response::new(200, "a1")),
                (id("/b"), Response::new(200, "b1")),
            ])
            .await
            .unwrap();
        store
            .put_all(vec![(id("/a"), Response::new(200, "a2"))])
            .await
            .unwrap();

        assert_eq!(store.keys().await.unwrap(), vec![id("/a")]);
        assert_eq!(store.lookup(&id("/a")).await.unwrap().unwrap().body, b"a2");
        assert!(store.lookup(&id("/b")).await.unwrap().is_none());

        let info = store.info().await.unwrap();
        assert_eq!(info.state, GenerationState::Complete);
        assert_eq!(info.size_bytes, 2);
    }

    #[tokio::test]
    async fn open_is_shared_per_generation() {
        let storage = MemoryStorage::new();
        let first = storage.open(&gen("v1")).await.unwrap();
        first
            .put_all(vec![(id("/"), Response::new(200, "root"))])
            .await
            .unwrap();

        let second = storage.open(&gen("v1")).await.unwrap();
        assert!(second.lookup(&id("/")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_and_list() {
        let storage = MemoryStorage::new();
        storage.open(&gen("v1")).await.unwrap();
        storage.open(&gen("v2")).await.unwrap();

        assert_eq!(storage.list().await.unwrap().len(), 2);
        assert!(storage.delete(&gen("v1")).await.unwrap());
        assert!(!storage.delete(&gen("v1")).await.unwrap());

        let names: Vec<_> = storage
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(names, vec![gen("v2")]);
    }
}
