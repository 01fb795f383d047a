use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::SyncClient;
use crate::cache::keys;
use crate::error::SyncResult;
use crate::models::{
    ContentFlag, ReviewMode, ReviewRating, ReviewTarget, StoryDetail, StoryStatus, WordDetail,
    WordStatus,
};
use crate::queue::mutation::{
    QuizResultPayload, SentenceReviewPayload, StoryAction, StoryActionPayload, WordReviewPayload,
};
use crate::queue::Mutation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoOutcome {
    /// The mutation was still queued and will now never be sent.
    pub was_pending: bool,
    /// The server acknowledged the undo call.
    pub remote_undone: bool,
}

impl SyncClient {
    /// Queues `mutation`, applies its optimistic effect and returns its id.
    ///
    /// Only fails when the queue itself cannot be written. Resubmitting an id
    /// that is still queued returns it without applying the effect again.
    pub async fn submit(
        &self,
        mutation: Mutation,
        client_mutation_id: Option<String>,
    ) -> SyncResult<String> {
        if let Some(id) = client_mutation_id.as_deref() {
            if self.inner.queue.contains(id).await {
                debug!(client_mutation_id = id, "duplicate submit ignored");
                return Ok(id.to_string());
            }
        }

        let id = self
            .inner
            .queue
            .enqueue(mutation.clone(), client_mutation_id)
            .await?;
        self.apply_optimistic(&mutation).await;
        Ok(id)
    }

    pub async fn submit_sentence_review(
        &self,
        session_id: Option<&str>,
        sentence_id: i64,
        primary_lemma_id: i64,
        mode: ReviewMode,
        rating: ReviewRating,
        response_ms: Option<u64>,
    ) -> SyncResult<String> {
        let payload = SentenceReviewPayload {
            sentence_id,
            primary_lemma_id,
            session_id: session_id.map(str::to_string),
            mode,
            rating,
            response_ms,
            reviewed_at: Utc::now(),
        };
        self.submit(Mutation::SentenceReview(payload), None).await
    }

    pub async fn submit_word_review(
        &self,
        session_id: Option<&str>,
        lemma_id: i64,
        mode: ReviewMode,
        rating: ReviewRating,
        response_ms: Option<u64>,
    ) -> SyncResult<String> {
        let payload = WordReviewPayload {
            lemma_id,
            session_id: session_id.map(str::to_string),
            mode,
            rating,
            response_ms,
            reviewed_at: Utc::now(),
        };
        self.submit(Mutation::WordReview(payload), None).await
    }

    /// Reverses a review submitted earlier under `client_mutation_id`.
    ///
    /// The queued entry is dropped if it has not been sent. If a flush is
    /// delivering it right now, the undo waits for that delivery so the server
    /// never sees the undo first. The local effect is reversed once, and the
    /// server is asked to undo in case the review already landed. A failed
    /// server call is logged only.
    pub async fn undo_review(&self, client_mutation_id: &str, target: &ReviewTarget) -> UndoOutcome {
        let was_pending = self.inner.queue.cancel(client_mutation_id).await;

        match self.inner.ledger.unmark(target).await {
            Ok(true) => self.inner.cache.adjust_reviews_today(-1).await,
            Ok(false) => debug!(client_mutation_id, "card was not marked reviewed"),
            Err(err) => warn!(client_mutation_id, error = %err, "failed to unmark reviewed card"),
        }

        let remote_undone = match self.inner.remote.undo_sentence_review(client_mutation_id).await {
            Ok(()) => true,
            Err(err) => {
                warn!(client_mutation_id, was_pending, error = %err, "remote undo failed");
                false
            }
        };

        debug!(client_mutation_id, was_pending, remote_undone, "review undone");
        UndoOutcome {
            was_pending,
            remote_undone,
        }
    }

    pub async fn submit_quiz_result(
        &self,
        quiz_id: &str,
        lemma_id: i64,
        correct: bool,
    ) -> SyncResult<String> {
        let payload = QuizResultPayload {
            quiz_id: quiz_id.to_string(),
            lemma_id,
            correct,
            answered_at: Utc::now(),
        };
        self.submit(Mutation::QuizResult(payload), None).await
    }

    pub async fn complete_story(&self, story_id: i64) -> SyncResult<String> {
        self.submit_story_action(story_id, StoryAction::Complete).await
    }

    pub async fn skip_story(&self, story_id: i64) -> SyncResult<String> {
        self.submit_story_action(story_id, StoryAction::Skip).await
    }

    pub async fn mark_story_too_difficult(&self, story_id: i64) -> SyncResult<String> {
        self.submit_story_action(story_id, StoryAction::TooDifficult).await
    }

    async fn submit_story_action(&self, story_id: i64, action: StoryAction) -> SyncResult<String> {
        let state = self.inner.lookups.lookup_state(story_id).await;
        let payload = StoryActionPayload {
            story_id,
            action,
            looked_up_lemma_ids: state.lemma_ids(),
            acted_at: Utc::now(),
        };
        self.submit(Mutation::StoryAction(payload), None).await
    }

    /// Adds a word to the learner's deck. Direct remote call.
    pub async fn introduce_word(&self, lemma_id: i64) -> SyncResult<WordDetail> {
        let id = Uuid::new_v4().to_string();
        let detail = WordDetail::from(self.inner.remote.introduce_word(&id, lemma_id).await?);
        self.inner
            .cache
            .cache_data(&keys::word_detail_key(lemma_id), &detail)
            .await;
        Ok(detail)
    }

    pub async fn suspend_word(&self, lemma_id: i64) -> SyncResult<()> {
        let id = Uuid::new_v4().to_string();
        self.inner.remote.suspend_word(&id, lemma_id).await?;
        self.inner
            .cache
            .update_cached::<WordDetail, _>(&keys::word_detail_key(lemma_id), |detail| {
                detail.status = WordStatus::Suspended;
            })
            .await;
        Ok(())
    }

    pub async fn flag_content(&self, flag: &ContentFlag) -> SyncResult<()> {
        let id = Uuid::new_v4().to_string();
        self.inner.remote.flag_content(&id, flag).await?;
        Ok(())
    }

    async fn apply_optimistic(&self, mutation: &Mutation) {
        if let Some(target) = mutation.review_target() {
            if let Err(err) = self.inner.ledger.mark(&target).await {
                warn!(kind = mutation.kind(), error = %err, "failed to mark card reviewed");
            }
            self.inner.cache.adjust_reviews_today(1).await;
            return;
        }

        if let Mutation::StoryAction(payload) = mutation {
            let status = match payload.action {
                StoryAction::Complete => StoryStatus::Completed,
                StoryAction::Skip => StoryStatus::Skipped,
                StoryAction::TooDifficult => StoryStatus::TooDifficult,
            };
            self.inner
                .cache
                .update_cached::<StoryDetail, _>(&keys::story_key(payload.story_id), |story| {
                    story.status = status;
                })
                .await;
            self.inner.lookups.clear(payload.story_id).await;
        }
    }
}
