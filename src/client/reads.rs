use tracing::debug;

use super::SyncClient;
use crate::cache::{keys, StoryLookupState};
use crate::error::{SyncError, SyncResult};
use crate::models::{
    ReviewMode, ReviewSession, Stats, StoryDetail, StoryPage, WordDetail, WordLookup, WordPage,
};

impl SyncClient {
    /// One page of the word list; the following page is prefetched in the
    /// background.
    pub async fn get_words(&self, page: u32) -> SyncResult<WordPage> {
        let remote = &self.inner.remote;
        let words = self
            .inner
            .cache
            .fetch_with_fallback(&keys::words_key(page), async {
                remote.fetch_words(page).await.map(|r| r.into_model(page))
            })
            .await?;

        if words.has_more {
            self.prefetch_words(page.saturating_add(1));
        }
        Ok(words)
    }

    pub async fn get_word_detail(&self, lemma_id: i64) -> SyncResult<WordDetail> {
        let remote = &self.inner.remote;
        self.inner
            .cache
            .fetch_with_fallback(&keys::word_detail_key(lemma_id), async {
                remote.fetch_word_detail(lemma_id).await.map(WordDetail::from)
            })
            .await
    }

    pub async fn get_stats(&self) -> SyncResult<Stats> {
        let remote = &self.inner.remote;
        self.inner
            .cache
            .fetch_with_fallback(keys::stats_key(), async {
                remote.fetch_stats().await.map(Stats::from)
            })
            .await
    }

    /// A fresh session from the server, or the filtered cached one when the
    /// server is unreachable.
    pub async fn get_session(&self, mode: ReviewMode) -> SyncResult<ReviewSession> {
        match self.inner.remote.fetch_session(mode).await {
            Ok(response) => {
                let session = response.into_model(mode);
                self.inner.cache.cache_session(&session).await;
                Ok(session)
            }
            Err(err) => match self.get_cached_session(mode).await {
                Some(session) => {
                    debug!(mode = %mode, session_id = %session.session_id, error = %err, "serving cached session");
                    Ok(session)
                }
                None => Err(SyncError::Remote(err)),
            },
        }
    }

    pub async fn get_cached_session(&self, mode: ReviewMode) -> Option<ReviewSession> {
        self.inner
            .cache
            .get_cached_session(mode, &self.inner.ledger)
            .await
    }

    /// One page of stories; details of the first few are prefetched.
    pub async fn get_stories(&self, page: u32) -> SyncResult<StoryPage> {
        let remote = &self.inner.remote;
        let stories = self
            .inner
            .cache
            .fetch_with_fallback(&keys::stories_key(page), async {
                remote.fetch_stories(page).await.map(|r| r.into_model(page))
            })
            .await?;

        let ids: Vec<i64> = stories
            .stories
            .iter()
            .take(self.inner.prefetch_stories)
            .map(|s| s.story_id)
            .collect();
        if !ids.is_empty() {
            self.prefetch_stories(ids);
        }
        Ok(stories)
    }

    pub async fn get_story(&self, story_id: i64) -> SyncResult<StoryDetail> {
        let remote = &self.inner.remote;
        self.inner
            .cache
            .fetch_with_fallback(&keys::story_key(story_id), async {
                remote.fetch_story(story_id).await.map(StoryDetail::from)
            })
            .await
    }

    pub async fn lookup_word(&self, text: &str) -> SyncResult<WordLookup> {
        let remote = &self.inner.remote;
        self.inner
            .cache
            .fetch_with_fallback(&keys::word_lookup_key(text), async {
                remote.lookup_word(text).await.map(WordLookup::from)
            })
            .await
    }

    /// Looks up the word at `position` in a story and records the lookup in
    /// the story's lookup state.
    pub async fn lookup_story_word(&self, story_id: i64, position: u32) -> SyncResult<WordLookup> {
        let remote = &self.inner.remote;
        let lookup = self
            .inner
            .cache
            .fetch_with_fallback(&keys::story_word_lookup_key(story_id, position), async {
                remote
                    .lookup_story_word(story_id, position)
                    .await
                    .map(WordLookup::from)
            })
            .await?;

        self.inner
            .lookups
            .record_lookup(story_id, position, lookup.lemma_id)
            .await;
        Ok(lookup)
    }

    /// Reverses a lookup the learner tapped by mistake.
    pub async fn remove_story_lookup(&self, story_id: i64, position: u32) -> StoryLookupState {
        self.inner.lookups.remove_lookup(story_id, position).await
    }

    pub async fn story_lookup_state(&self, story_id: i64) -> StoryLookupState {
        self.inner.lookups.lookup_state(story_id).await
    }

    fn prefetch_words(&self, page: u32) {
        let client = self.clone();
        tokio::spawn(async move {
            match client.inner.remote.fetch_words(page).await {
                Ok(response) => {
                    let words = response.into_model(page);
                    client.inner.cache.cache_data(&keys::words_key(page), &words).await;
                }
                Err(err) => debug!(page, error = %err, "word page prefetch failed"),
            }
        });
    }

    fn prefetch_stories(&self, story_ids: Vec<i64>) {
        let client = self.clone();
        tokio::spawn(async move {
            for story_id in story_ids {
                match client.inner.remote.fetch_story(story_id).await {
                    Ok(response) => {
                        let story = StoryDetail::from(response);
                        client.inner.cache.cache_data(&keys::story_key(story_id), &story).await;
                    }
                    Err(err) => {
                        debug!(story_id, error = %err, "story prefetch failed");
                        // offline or server down: stop the batch
                        if err.is_retryable() {
                            break;
                        }
                    }
                }
            }
        });
    }
}
