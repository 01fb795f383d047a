pub mod keys;
pub mod lookup;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::ledger::{ReviewedKey, ReviewedLedger, LEDGER_KEY};
use crate::models::{ReviewMode, ReviewSession, ReviewTarget, Stats, WordLookup};
use crate::remote::RemoteError;
use crate::store::{get_json, set_json, KeyValueStore, StoreResult};

use keys::{CACHE_INDEX_KEY, MAX_CACHED_SESSIONS};

pub use lookup::{StoryLookupState, StoryLookupStore};

/// Network-first cache over the key-value store.
///
/// Writes fully replace the previous value for a key. Population is a
/// secondary write: failures are logged and never reach the caller.
#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn KeyValueStore>,
    index_lock: Arc<Mutex<()>>,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            index_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn cache_data<T>(&self, key: &str, value: &T)
    where
        T: Serialize + ?Sized,
    {
        if let Err(err) = self.try_cache_data(key, value).await {
            warn!(key, error = %err, "failed to populate cache");
        }
    }

    /// Missing or unreadable entries resolve to `None`.
    pub async fn get_cached_data<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match get_json(self.store.as_ref(), key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "failed to read cache");
                None
            }
        }
    }

    pub async fn remove(&self, key: &str) {
        let _lock = self.index_lock.lock().await;
        if let Err(err) = self.store.remove(key).await {
            warn!(key, error = %err, "failed to remove cache entry");
            return;
        }
        let mut index = self.load_index().await;
        if index.remove(key) {
            if let Err(err) = set_json(self.store.as_ref(), CACHE_INDEX_KEY, &index).await {
                warn!(error = %err, "failed to persist cache index");
            }
        }
    }

    /// Applies `update` to a cached value in place. Returns `false` when
    /// nothing is cached under `key`.
    pub async fn update_cached<T, F>(&self, key: &str, update: F) -> bool
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let Some(mut value) = self.get_cached_data::<T>(key).await else {
            return false;
        };
        update(&mut value);
        self.cache_data(key, &value).await;
        true
    }

    /// Runs `fetch`; on success caches and returns the result, on failure
    /// returns the last cached value for `key`. The remote error surfaces only
    /// when nothing is cached.
    pub async fn fetch_with_fallback<T, Fut>(&self, key: &str, fetch: Fut) -> SyncResult<T>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        match fetch.await {
            Ok(value) => {
                self.cache_data(key, &value).await;
                Ok(value)
            }
            Err(err) => match self.get_cached_data::<T>(key).await {
                Some(cached) => {
                    debug!(key, error = %err, "remote read failed, serving cached copy");
                    Ok(cached)
                }
                None => Err(SyncError::Remote(err)),
            },
        }
    }

    /// Stores `session` at the front of its mode's list, replacing an older
    /// copy with the same id and keeping at most five.
    pub async fn cache_session(&self, session: &ReviewSession) {
        let key = keys::sessions_key(session.mode);
        let mut sessions = self.cached_sessions(session.mode).await;
        sessions.retain(|s| s.session_id != session.session_id);
        sessions.insert(0, session.clone());
        sessions.truncate(MAX_CACHED_SESSIONS);
        self.cache_data(&key, &sessions).await;
    }

    pub async fn cached_sessions(&self, mode: ReviewMode) -> Vec<ReviewSession> {
        self.get_cached_data::<Vec<ReviewSession>>(&keys::sessions_key(mode))
            .await
            .unwrap_or_default()
    }

    /// The latest cached session for `mode` without the cards the ledger
    /// already holds. `None` when no session is cached or every card has been
    /// answered.
    pub async fn get_cached_session(
        &self,
        mode: ReviewMode,
        ledger: &ReviewedLedger,
    ) -> Option<ReviewSession> {
        let mut session = self.cached_sessions(mode).await.into_iter().next()?;
        let reviewed = ledger.keys().await;

        session.items.retain(|item| {
            let target = ReviewTarget {
                session_id: Some(session.session_id.clone()),
                sentence_id: item.sentence_id,
                lemma_id: item.lemma_id,
                mode,
            };
            !ReviewedKey::for_target(&target)
                .iter()
                .any(|key| reviewed.contains(key))
        });

        if session.is_empty() {
            debug!(mode = %mode, session_id = %session.session_id, "cached session fully reviewed");
            return None;
        }
        Some(session)
    }

    pub async fn cache_word_lookup(&self, text: &str, lookup: &WordLookup) {
        self.cache_data(&keys::word_lookup_key(text), lookup).await;
    }

    pub async fn get_cached_word_lookup(&self, text: &str) -> Option<WordLookup> {
        self.get_cached_data(&keys::word_lookup_key(text)).await
    }

    /// Bumps today's review count in cached stats, if any are cached.
    pub async fn adjust_reviews_today(&self, delta: i32) {
        self.update_cached::<Stats, _>(keys::stats_key(), |stats| {
            stats.reviews_today = stats.reviews_today.saturating_add_signed(delta);
        })
        .await;
    }

    /// Drops every cached resource, the cache index and the reviewed ledger.
    pub async fn invalidate(&self) -> StoreResult<()> {
        let _lock = self.index_lock.lock().await;
        let mut doomed: Vec<String> = self.load_index().await.into_iter().collect();
        doomed.push(CACHE_INDEX_KEY.to_string());
        doomed.push(LEDGER_KEY.to_string());

        self.store.remove_many(&doomed).await?;
        debug!(removed = doomed.len(), "cache invalidated");
        Ok(())
    }

    async fn try_cache_data<T>(&self, key: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.register_key(key).await?;
        set_json(self.store.as_ref(), key, value).await
    }

    async fn register_key(&self, key: &str) -> StoreResult<()> {
        let _lock = self.index_lock.lock().await;
        let mut index = self.load_index().await;
        if index.insert(key.to_string()) {
            set_json(self.store.as_ref(), CACHE_INDEX_KEY, &index).await?;
        }
        Ok(())
    }

    async fn load_index(&self) -> BTreeSet<String> {
        self.get_cached_data::<BTreeSet<String>>(CACHE_INDEX_KEY)
            .await
            .unwrap_or_default()
    }
}
