//! Per-story record of looked-up word positions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::keys::story_lookup_state_key;
use super::ReadThroughCache;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryLookupState {
    pub story_id: i64,
    /// Token position -> lemma it resolved to.
    pub lookups: BTreeMap<u32, i64>,
}

impl StoryLookupState {
    pub fn new(story_id: i64) -> Self {
        Self {
            story_id,
            lookups: BTreeMap::new(),
        }
    }

    pub fn positions(&self) -> Vec<u32> {
        self.lookups.keys().copied().collect()
    }

    /// Distinct lemma ids, ascending.
    pub fn lemma_ids(&self) -> Vec<i64> {
        self.lookups
            .values()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }
}

#[derive(Clone)]
pub struct StoryLookupStore {
    cache: ReadThroughCache,
    write_lock: Arc<Mutex<()>>,
}

impl StoryLookupStore {
    pub fn new(cache: ReadThroughCache) -> Self {
        Self {
            cache,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn record_lookup(&self, story_id: i64, position: u32, lemma_id: i64) -> StoryLookupState {
        let _lock = self.write_lock.lock().await;
        let mut state = self.lookup_state(story_id).await;
        state.lookups.insert(position, lemma_id);
        self.cache.cache_data(&story_lookup_state_key(story_id), &state).await;
        state
    }

    pub async fn remove_lookup(&self, story_id: i64, position: u32) -> StoryLookupState {
        let _lock = self.write_lock.lock().await;
        let mut state = self.lookup_state(story_id).await;
        if state.lookups.remove(&position).is_some() {
            self.cache.cache_data(&story_lookup_state_key(story_id), &state).await;
        }
        state
    }

    /// Empty state when the story has no lookups yet.
    pub async fn lookup_state(&self, story_id: i64) -> StoryLookupState {
        self.cache
            .get_cached_data(&story_lookup_state_key(story_id))
            .await
            .unwrap_or_else(|| StoryLookupState::new(story_id))
    }

    pub async fn clear(&self, story_id: i64) {
        let _lock = self.write_lock.lock().await;
        self.cache.remove(&story_lookup_state_key(story_id)).await;
    }
}
