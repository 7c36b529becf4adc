//! Per-request interception
//!
//! Cache first, network on miss. A hit never touches the network and a miss
//! is never written back; whatever the network produces, failure included,
//! goes back to the caller unchanged.

use crate::cache::CacheStore;
use crate::error::PrecacheResult;
use crate::network::{Fetcher, Request, Response};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Where a routed response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A response together with its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub response: Response,
    pub source: Source,
}

/// Read-only request router over one generation's store
#[derive(Clone)]
pub struct Router {
    store: Option<Arc<dyn CacheStore>>,
    fetcher: Arc<dyn Fetcher>,
}

impl Router {
    /// Router answering from `store`
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            store: Some(store),
            fetcher,
        }
    }

    /// Router with no store: every request goes to the network
    pub fn passthrough(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            store: None,
            fetcher,
        }
    }

    /// Produce exactly one response for `request`.
    ///
    /// Method and headers do not take part in the lookup.
    pub async fn route(&self, request: &Request) -> PrecacheResult<Routed> {
        if let Some(store) = &self.store {
            if let Some(response) = store.lookup(&request.id).await? {
                debug!("{} {} served from {}", request.method, request.id, store.generation());
                return Ok(Routed {
                    response,
                    source: Source::Cache,
                });
            }
        }

        debug!("{} {} not cached, fetching", request.method, request.id);
        let response = self.fetcher.fetch(request).await?;
        Ok(Routed {
            response,
            source: Source::Network,
        })
    }
}
