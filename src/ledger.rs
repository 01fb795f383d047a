//! Local record of answered review cards.
//!
//! Each mark writes a mode-scoped key (`{mode}:{sentence_id|word}:{lemma_id}`)
//! and, when the session is known, a session-scoped key
//! (`{session_id}:{sentence_id|word}:{lemma_id}`). Cached sessions are filtered
//! against both, and an undo clears both.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::models::{ReviewMode, ReviewTarget};
use crate::store::{get_json, set_json, KeyValueStore, StoreResult};

pub const LEDGER_KEY: &str = "@reviewed/keys";

const WORD_ONLY_SEGMENT: &str = "word";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewedKey;

impl ReviewedKey {
    pub fn mode_key(mode: ReviewMode, sentence_id: Option<i64>, lemma_id: i64) -> String {
        format!("{}:{}:{}", mode.as_str(), sentence_segment(sentence_id), lemma_id)
    }

    pub fn session_key(session_id: &str, sentence_id: Option<i64>, lemma_id: i64) -> String {
        format!("{}:{}:{}", session_id, sentence_segment(sentence_id), lemma_id)
    }

    /// One or two keys, depending on whether a session id is available.
    pub fn for_target(target: &ReviewTarget) -> Vec<String> {
        let mut keys = vec![Self::mode_key(target.mode, target.sentence_id, target.lemma_id)];
        if let Some(session_id) = target.session_id.as_deref().filter(|s| !s.is_empty()) {
            keys.push(Self::session_key(session_id, target.sentence_id, target.lemma_id));
        }
        keys
    }
}

fn sentence_segment(sentence_id: Option<i64>) -> String {
    match sentence_id {
        Some(id) => id.to_string(),
        None => WORD_ONLY_SEGMENT.to_string(),
    }
}

#[derive(Clone)]
pub struct ReviewedLedger {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl ReviewedLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn mark_reviewed(
        &self,
        session_id: Option<&str>,
        sentence_id: Option<i64>,
        lemma_id: i64,
        mode: ReviewMode,
    ) -> StoreResult<()> {
        self.mark(&target(session_id, sentence_id, lemma_id, mode)).await
    }

    pub async fn unmark_reviewed(
        &self,
        session_id: Option<&str>,
        sentence_id: Option<i64>,
        lemma_id: i64,
        mode: ReviewMode,
    ) -> StoreResult<bool> {
        self.unmark(&target(session_id, sentence_id, lemma_id, mode)).await
    }

    pub async fn mark(&self, target: &ReviewTarget) -> StoreResult<()> {
        let _lock = self.write_lock.lock().await;
        let mut keys = self.load().await?;
        let before = keys.len();
        keys.extend(ReviewedKey::for_target(target));
        if keys.len() == before {
            return Ok(());
        }
        set_json(self.store.as_ref(), LEDGER_KEY, &keys).await
    }

    /// Returns whether any key was removed.
    pub async fn unmark(&self, target: &ReviewTarget) -> StoreResult<bool> {
        let _lock = self.write_lock.lock().await;
        let mut keys = self.load().await?;
        let before = keys.len();
        for key in ReviewedKey::for_target(target) {
            keys.remove(&key);
        }
        if keys.len() == before {
            return Ok(false);
        }
        set_json(self.store.as_ref(), LEDGER_KEY, &keys).await?;
        Ok(true)
    }

    pub async fn is_reviewed(&self, target: &ReviewTarget) -> bool {
        let keys = self.keys().await;
        ReviewedKey::for_target(target)
            .iter()
            .any(|key| keys.contains(key))
    }

    /// Snapshot of the ledger; empty when unreadable.
    pub async fn keys(&self) -> BTreeSet<String> {
        match self.load().await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "failed to read reviewed ledger");
                BTreeSet::new()
            }
        }
    }

    async fn load(&self) -> StoreResult<BTreeSet<String>> {
        Ok(get_json::<BTreeSet<String>>(self.store.as_ref(), LEDGER_KEY)
            .await?
            .unwrap_or_default())
    }
}

fn target(
    session_id: Option<&str>,
    sentence_id: Option<i64>,
    lemma_id: i64,
    mode: ReviewMode,
) -> ReviewTarget {
    ReviewTarget {
        session_id: session_id.map(str::to_string),
        sentence_id,
        lemma_id,
        mode,
    }
}
