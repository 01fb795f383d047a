//! The one surface the UI talks to.
//!
//! Reads go network-first through the [`ReadThroughCache`]. Queued writes are
//! local-first: they land in the [`MutationQueue`], apply their optimistic
//! effect and return before any network round trip. A handful of actions
//! (word management, content flags) are direct remote calls instead.

mod reads;
mod writes;

use std::sync::Arc;

use tracing::info;

use crate::cache::{ReadThroughCache, StoryLookupStore};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::ledger::ReviewedLedger;
use crate::queue::{FlushReport, MutationQueue};
use crate::remote::{HttpRemote, RemoteService};
use crate::store::{KeyValueStore, SqliteStore};

pub use writes::UndoOutcome;

#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    remote: Arc<dyn RemoteService>,
    queue: MutationQueue,
    ledger: ReviewedLedger,
    cache: ReadThroughCache,
    lookups: StoryLookupStore,
    prefetch_stories: usize,
}

impl SyncClient {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteService>,
        config: &SyncConfig,
    ) -> Self {
        let cache = ReadThroughCache::new(Arc::clone(&store));
        Self {
            inner: Arc::new(ClientInner {
                remote,
                queue: MutationQueue::new(Arc::clone(&store), config.queue.clone()),
                ledger: ReviewedLedger::new(store),
                lookups: StoryLookupStore::new(cache.clone()),
                cache,
                prefetch_stories: config.prefetch_stories,
            }),
        }
    }

    /// SQLite store at `config.store_path` and the HTTP remote.
    pub async fn open(config: &SyncConfig) -> SyncResult<Self> {
        let store = SqliteStore::open(&config.store_path).await?;
        let remote = HttpRemote::new(&config.remote);
        info!(path = %config.store_path.display(), base_url = %config.remote.base_url, "sync client opened");
        Ok(Self::new(Arc::new(store), Arc::new(remote), config))
    }

    pub async fn flush(&self) -> FlushReport {
        self.inner.queue.flush(self.inner.remote.as_ref()).await
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.queue.pending_count().await
    }

    /// Treats all local state as stale: every cached resource, the reviewed
    /// ledger and story lookup state go. Pending mutations are kept.
    pub async fn invalidate(&self) -> SyncResult<()> {
        self.inner.cache.invalidate().await?;
        info!("local caches invalidated");
        Ok(())
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.inner.queue
    }

    pub fn ledger(&self) -> &ReviewedLedger {
        &self.inner.ledger
    }

    pub fn cache(&self) -> &ReadThroughCache {
        &self.inner.cache
    }
}
