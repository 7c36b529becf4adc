//! Durable on-disk cache storage
//!
//! Layout under the storage root:
//!
//! ```text
//! generations/
//!   <generation>/
//!     generation.json          state, timestamps, committed identifiers
//!     entries/<sha256>.json    status + headers for one identifier
//!     entries/<sha256>.body    response body
//!   .staging+<generation>+<uuid>/   a put_all in progress
//! ```
//!
//! `put_all` builds a complete generation in a staging directory and swaps
//! it into place with renames, so a reader sees either the old contents or
//! the new ones. Every staged file and both directories are synced before
//! `put_all` returns. Staging directories left behind by an abandoned install
//! are removed the next time the generation is opened; a commit interrupted
//! between its two renames is rolled back to the previous contents.

use crate::cache::generation::{GenerationId, GenerationInfo, GenerationState};
use crate::cache::storage::{CacheStorage, CacheStore};
use crate::error::{PrecacheError, PrecacheResult};
use crate::manifest::ResourceId;
use crate::network::Response;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const GENERATIONS_DIR: &str = "generations";
const RECORD_FILE: &str = "generation.json";
const ENTRIES_DIR: &str = "entries";
const STAGING_PREFIX: &str = ".staging+";
const RETIRED_PREFIX: &str = ".retired+";

/// Persisted per-generation record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationRecord {
    info: GenerationInfo,
    entries: Vec<ResourceId>,
}

/// Persisted response head for one identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryRecord {
    id: ResourceId,
    status: u16,
    headers: Vec<(String, String)>,
    body_len: u64,
    stored_at: DateTime<Utc>,
}

/// File stem for an identifier: full SHA-256 of the normalized string
fn entry_key(id: &ResourceId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

async fn read_json<T: serde::de::DeserializeOwned>(
    generation: &GenerationId,
    path: &Path,
) -> PrecacheResult<Option<T>> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PrecacheError::store(
                generation.as_str(),
                format!("reading {}: {}", path.display(), e),
            ))
        }
    };

    serde_json::from_slice(&content).map(Some).map_err(|e| {
        PrecacheError::store(
            generation.as_str(),
            format!("corrupt {}: {}", path.display(), e),
        )
    })
}

async fn write_file(
    generation: &GenerationId,
    path: &Path,
    contents: &[u8],
) -> PrecacheResult<()> {
    let write = async {
        let mut file = fs::File::create(path).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    };
    write.await.map_err(|e| {
        PrecacheError::store(
            generation.as_str(),
            format!("writing {}: {}", path.display(), e),
        )
    })
}

/// Flush a directory's entries (new files, renames) to disk
#[cfg(unix)]
async fn sync_dir(generation: &GenerationId, path: &Path) -> PrecacheResult<()> {
    let sync = async { fs::File::open(path).await?.sync_all().await };
    sync.await.map_err(|e| {
        PrecacheError::store(
            generation.as_str(),
            format!("syncing {}: {}", path.display(), e),
        )
    })
}

#[cfg(not(unix))]
async fn sync_dir(_generation: &GenerationId, _path: &Path) -> PrecacheResult<()> {
    Ok(())
}

async fn write_json<T: Serialize>(
    generation: &GenerationId,
    path: &Path,
    value: &T,
) -> PrecacheResult<()> {
    let content = serde_json::to_vec_pretty(value)?;
    write_file(generation, path, &content).await
}

async fn create_dir(generation: &GenerationId, path: &Path) -> PrecacheResult<()> {
    fs::create_dir_all(path).await.map_err(|e| {
        PrecacheError::store(
            generation.as_str(),
            format!("creating {}: {}", path.display(), e),
        )
    })
}

/// One generation stored in its own directory
pub struct DiskStore {
    generation: GenerationId,
    generations_dir: PathBuf,
    dir: PathBuf,
}

impl DiskStore {
    fn new(generations_dir: &Path, generation: &GenerationId) -> Self {
        Self {
            generation: generation.clone(),
            generations_dir: generations_dir.to_path_buf(),
            dir: generations_dir.join(generation.as_str()),
        }
    }

    async fn record(&self) -> PrecacheResult<GenerationRecord> {
        let record = read_json(&self.generation, &self.dir.join(RECORD_FILE)).await?;
        Ok(record.unwrap_or_else(|| GenerationRecord {
            info: GenerationInfo::building(self.generation.clone()),
            entries: Vec::new(),
        }))
    }

    /// Create the directory and a `building` record if the generation is new
    async fn ensure_created(&self) -> PrecacheResult<()> {
        if fs::try_exists(self.dir.join(RECORD_FILE))
            .await
            .unwrap_or(false)
        {
            return Ok(());
        }

        create_dir(&self.generation, &self.dir.join(ENTRIES_DIR)).await?;
        let record = GenerationRecord {
            info: GenerationInfo::building(self.generation.clone()),
            entries: Vec::new(),
        };
        write_json(&self.generation, &self.dir.join(RECORD_FILE), &record).await?;
        debug!("Created generation {} at {}", self.generation, self.dir.display());
        Ok(())
    }

    fn scratch_dir(&self, prefix: &str) -> PathBuf {
        self.generations_dir
            .join(format!("{}{}+{}", prefix, self.generation, Uuid::new_v4()))
    }

    /// Write every entry plus a `complete` record into `staging`
    async fn stage(
        &self,
        staging: &Path,
        entries: Vec<(ResourceId, Response)>,
        created_at: DateTime<Utc>,
    ) -> PrecacheResult<()> {
        let entries_dir = staging.join(ENTRIES_DIR);
        create_dir(&self.generation, &entries_dir).await?;

        let now = Utc::now();
        let mut ids = Vec::with_capacity(entries.len());
        let mut size_bytes = 0u64;

        for (id, response) in entries {
            let key = entry_key(&id);
            write_file(
                &self.generation,
                &entries_dir.join(format!("{}.body", key)),
                &response.body,
            )
            .await?;

            let head = EntryRecord {
                id: id.clone(),
                status: response.status,
                headers: response.headers,
                body_len: response.body.len() as u64,
                stored_at: now,
            };
            write_json(
                &self.generation,
                &entries_dir.join(format!("{}.json", key)),
                &head,
            )
            .await?;

            size_bytes += head.body_len;
            ids.push(id);
        }

        let record = GenerationRecord {
            info: GenerationInfo {
                id: self.generation.clone(),
                state: GenerationState::Complete,
                created_at,
                committed_at: Some(now),
                entry_count: ids.len(),
                size_bytes,
            },
            entries: ids,
        };
        write_json(&self.generation, &staging.join(RECORD_FILE), &record).await?;

        sync_dir(&self.generation, &entries_dir).await?;
        sync_dir(&self.generation, staging).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> PrecacheResult<()> {
        fs::rename(from, to).await.map_err(|e| {
            PrecacheError::store(
                self.generation.as_str(),
                format!("renaming {} to {}: {}", from.display(), to.display(), e),
            )
        })
    }

    /// Swap a fully staged directory into place
    async fn swap_in(&self, staging: &Path) -> PrecacheResult<()> {
        let retired = if fs::try_exists(&self.dir).await.unwrap_or(false) {
            let retired = self.scratch_dir(RETIRED_PREFIX);
            self.rename(&self.dir, &retired).await?;
            Some(retired)
        } else {
            None
        };

        self.rename(staging, &self.dir).await?;
        sync_dir(&self.generation, &self.generations_dir).await?;

        if let Some(retired) = retired {
            if let Err(e) = fs::remove_dir_all(&retired).await {
                warn!("Failed to remove retired {}: {}", retired.display(), e);
            }
        }
        Ok(())
    }

    /// Remove scratch directories left behind by earlier, abandoned writes.
    ///
    /// If the generation directory itself is missing, a commit was cut off
    /// between its renames and the retired copy is moved back into place.
    async fn sweep_scratch(&self) -> PrecacheResult<()> {
        let mut entries = match fs::read_dir(&self.generations_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(PrecacheError::store(self.generation.as_str(), e)),
        };

        let staging = format!("{}{}+", STAGING_PREFIX, self.generation);
        let retired = format!("{}{}+", RETIRED_PREFIX, self.generation);
        let mut missing = !fs::try_exists(&self.dir).await.unwrap_or(false);

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PrecacheError::store(self.generation.as_str(), e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if missing
                && name.starts_with(&retired)
                && fs::try_exists(entry.path().join(RECORD_FILE))
                    .await
                    .unwrap_or(false)
            {
                warn!("Rolling back interrupted commit of {}", self.generation);
                self.rename(&entry.path(), &self.dir).await?;
                sync_dir(&self.generation, &self.generations_dir).await?;
                missing = false;
                continue;
            }
            if name.starts_with(&staging) || name.starts_with(&retired) {
                debug!("Removing abandoned {}", name);
                if let Err(e) = fs::remove_dir_all(entry.path()).await {
                    warn!("Failed to remove {}: {}", entry.path().display(), e);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    fn generation(&self) -> &GenerationId {
        &self.generation
    }

    async fn put_all(&self, entries: Vec<(ResourceId, Response)>) -> PrecacheResult<()> {
        let created_at = self.record().await?.info.created_at;
        let count = entries.len();
        let staging = self.scratch_dir(STAGING_PREFIX);

        let result = match self.stage(&staging, entries, created_at).await {
            Ok(()) => self.swap_in(&staging).await,
            Err(e) => Err(e),
        };

        if result.is_err() && fs::try_exists(&staging).await.unwrap_or(false) {
            if let Err(e) = fs::remove_dir_all(&staging).await {
                warn!("Failed to remove staging {}: {}", staging.display(), e);
            }
        }

        result?;
        debug!("Committed {} entries to generation {}", count, self.generation);
        Ok(())
    }

    async fn lookup(&self, id: &ResourceId) -> PrecacheResult<Option<Response>> {
        let key = entry_key(id);
        let entries_dir = self.dir.join(ENTRIES_DIR);

        let Some(head) =
            read_json::<EntryRecord>(&self.generation, &entries_dir.join(format!("{}.json", key)))
                .await?
        else {
            return Ok(None);
        };

        let body_path = entries_dir.join(format!("{}.body", key));
        let body = fs::read(&body_path).await.map_err(|e| {
            PrecacheError::store(
                self.generation.as_str(),
                format!("reading {}: {}", body_path.display(), e),
            )
        })?;

        Ok(Some(Response {
            status: head.status,
            headers: head.headers,
            body,
        }))
    }

    async fn keys(&self) -> PrecacheResult<Vec<ResourceId>> {
        Ok(self.record().await?.entries)
    }

    async fn info(&self) -> PrecacheResult<GenerationInfo> {
        Ok(self.record().await?.info)
    }
}

/// Directory-backed set of generations
pub struct DiskStorage {
    generations_dir: PathBuf,
}

impl DiskStorage {
    /// Storage rooted at `root`; generations live in `root/generations`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            generations_dir: root.as_ref().join(GENERATIONS_DIR),
        }
    }

    pub fn generations_dir(&self) -> &Path {
        &self.generations_dir
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, generation: &GenerationId) -> PrecacheResult<Arc<dyn CacheStore>> {
        let store = DiskStore::new(&self.generations_dir, generation);
        store.sweep_scratch().await?;
        store.ensure_created().await?;
        Ok(Arc::new(store) as Arc<dyn CacheStore>)
    }

    async fn get(&self, generation: &GenerationId) -> PrecacheResult<Option<Arc<dyn CacheStore>>> {
        let store = DiskStore::new(&self.generations_dir, generation);
        if !fs::try_exists(&store.dir).await.unwrap_or(false) {
            store.sweep_scratch().await?;
        }
        if fs::try_exists(&store.dir).await.unwrap_or(false) {
            Ok(Some(Arc::new(store) as Arc<dyn CacheStore>))
        } else {
            Ok(None)
        }
    }

    async fn list(&self) -> PrecacheResult<Vec<GenerationInfo>> {
        let mut entries = match fs::read_dir(&self.generations_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(PrecacheError::io(
                    format!("reading {}", self.generations_dir.display()),
                    e,
                ))
            }
        };

        let mut infos = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PrecacheError::io("reading generation entry", e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Scratch directories and foreign files are not generations
            let Ok(generation) = GenerationId::new(name) else {
                continue;
            };
            if !entry.path().is_dir() {
                continue;
            }

            let store = DiskStore::new(&self.generations_dir, &generation);
            match store.info().await {
                Ok(info) => infos.push(info),
                Err(e) => warn!("Skipping unreadable generation {}: {}", generation, e),
            }
        }

        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(infos)
    }

    async fn delete(&self, generation: &GenerationId) -> PrecacheResult<bool> {
        let dir = self.generations_dir.join(generation.as_str());
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("Deleted generation {}", generation);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PrecacheError::store(generation.as_str(), e)),
        }
    }
}
