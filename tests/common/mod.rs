#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use danci_sync_client::config::{QueueConfig, SyncConfig};
use danci_sync_client::models::{ContentFlag, ReviewMode};
use danci_sync_client::queue::mutation::{
    QuizResultPayload, SentenceReviewPayload, StoryActionPayload, WordReviewPayload,
};
use danci_sync_client::remote::wire::{
    LookupResponse, SessionItemWire, SessionResponse, StatsResponse, StoriesResponse,
    StoryResponse, StoryWire, TokenWire, WordDetailResponse, WordWire, WordsResponse,
};
use danci_sync_client::{MemoryStore, RemoteError, RemoteService, SyncClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Words,
    WordDetail,
    Stats,
    Session,
    Stories,
    Story,
    LookupWord,
    LookupStoryWord,
    SentenceReview,
    WordReview,
    UndoReview,
    QuizResult,
    StoryAction,
    IntroduceWord,
    SuspendWord,
    FlagContent,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint: Endpoint,
    pub client_mutation_id: Option<String>,
    pub body: serde_json::Value,
}

/// Scripted remote. Every call is logged; failures can be injected per endpoint
/// (sticky or one-shot) or per mutation id.
#[derive(Default)]
pub struct MockRemote {
    calls: Mutex<Vec<Call>>,
    offline: Mutex<bool>,
    sticky: Mutex<HashMap<Endpoint, RemoteError>>,
    once: Mutex<HashMap<Endpoint, VecDeque<RemoteError>>>,
    by_mutation: Mutex<HashMap<String, RemoteError>>,
    sessions: Mutex<HashMap<ReviewMode, SessionResponse>>,
    stats: Mutex<StatsResponse>,
    delivered: Mutex<Vec<String>>,
    review_gate: Mutex<Option<Arc<Semaphore>>>,
    held_reviews: Mutex<Vec<String>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        let remote = Self::default();
        *remote.stats.lock() = StatsResponse {
            reviews_today: 3,
            known_count: 40,
            learning_count: 12,
            due_count: 8,
            streak_days: 5,
        };
        Arc::new(remote)
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    pub fn fail(&self, endpoint: Endpoint, err: RemoteError) {
        self.sticky.lock().insert(endpoint, err);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.sticky.lock().remove(&endpoint);
    }

    pub fn fail_once(&self, endpoint: Endpoint, err: RemoteError) {
        self.once.lock().entry(endpoint).or_default().push_back(err);
    }

    pub fn fail_mutation(&self, client_mutation_id: &str, err: RemoteError) {
        self.by_mutation.lock().insert(client_mutation_id.to_string(), err);
    }

    pub fn recover_mutation(&self, client_mutation_id: &str) {
        self.by_mutation.lock().remove(client_mutation_id);
    }

    pub fn set_session(&self, mode: ReviewMode, session: SessionResponse) {
        self.sessions.lock().insert(mode, session);
    }

    pub fn set_stats(&self, stats: StatsResponse) {
        *self.stats.lock() = stats;
    }

    /// Makes sentence-review deliveries wait until the returned semaphore
    /// hands out a permit.
    pub fn hold_sentence_reviews(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.review_gate.lock() = Some(gate.clone());
        gate
    }

    /// Ids of sentence reviews that reached the gate.
    pub fn held_reviews(&self) -> Vec<String> {
        self.held_reviews.lock().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .cloned()
            .collect()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.calls_to(endpoint).len()
    }

    /// Mutation ids in the order the server accepted them.
    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(
        &self,
        endpoint: Endpoint,
        client_mutation_id: Option<&str>,
        body: serde_json::Value,
    ) -> Result<(), RemoteError> {
        self.calls.lock().push(Call {
            endpoint,
            client_mutation_id: client_mutation_id.map(str::to_string),
            body,
        });

        if *self.offline.lock() {
            return Err(RemoteError::Network("connection refused".to_string()));
        }
        if let Some(err) = self.once.lock().get_mut(&endpoint).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        if let Some(err) = self.sticky.lock().get(&endpoint) {
            return Err(err.clone());
        }
        if let Some(id) = client_mutation_id {
            if let Some(err) = self.by_mutation.lock().get(id) {
                return Err(err.clone());
            }
            if is_queued_write(endpoint) {
                self.delivered.lock().push(id.to_string());
            }
        }
        Ok(())
    }
}

fn is_queued_write(endpoint: Endpoint) -> bool {
    matches!(
        endpoint,
        Endpoint::SentenceReview | Endpoint::WordReview | Endpoint::QuizResult | Endpoint::StoryAction
    )
}

pub fn default_session(mode: ReviewMode) -> SessionResponse {
    SessionResponse {
        session_id: format!("s-{}", mode.as_str()),
        mode: Some(mode.as_str().to_string()),
        items: vec![session_item(Some(1), 10), session_item(Some(2), 20)],
    }
}

pub fn session_item(sentence_id: Option<i64>, lemma_id: i64) -> SessionItemWire {
    SessionItemWire {
        sentence_id,
        primary_lemma_id: lemma_id,
        lemma_text: format!("lemma-{lemma_id}"),
        gloss_en: Some(format!("gloss {lemma_id}")),
        sentence_text: sentence_id.map(|id| format!("sentence {id}")),
        sentence_translation: None,
    }
}

pub fn story_lemma(story_id: i64, position: u32) -> i64 {
    story_id * 100 + i64::from(position % 5)
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn fetch_words(&self, page: u32) -> Result<WordsResponse, RemoteError> {
        self.record(Endpoint::Words, None, serde_json::json!({ "page": page }))?;
        let start = i64::from(page) * 10;
        Ok(WordsResponse {
            words: (1..=2)
                .map(|n| WordWire {
                    lemma_id: start + n,
                    lemma_text: format!("word-{}", start + n),
                    gloss_en: None,
                    status: Some("learning".to_string()),
                })
                .collect(),
            total_pages: Some(3),
            has_more: None,
        })
    }

    async fn fetch_word_detail(&self, lemma_id: i64) -> Result<WordDetailResponse, RemoteError> {
        self.record(Endpoint::WordDetail, None, serde_json::json!({ "lemma_id": lemma_id }))?;
        Ok(word_detail(lemma_id, "learning"))
    }

    async fn fetch_stats(&self) -> Result<StatsResponse, RemoteError> {
        self.record(Endpoint::Stats, None, serde_json::Value::Null)?;
        Ok(self.stats.lock().clone())
    }

    async fn fetch_session(&self, mode: ReviewMode) -> Result<SessionResponse, RemoteError> {
        self.record(Endpoint::Session, None, serde_json::json!({ "mode": mode.as_str() }))?;
        Ok(self
            .sessions
            .lock()
            .get(&mode)
            .cloned()
            .unwrap_or_else(|| default_session(mode)))
    }

    async fn fetch_stories(&self, page: u32) -> Result<StoriesResponse, RemoteError> {
        self.record(Endpoint::Stories, None, serde_json::json!({ "page": page }))?;
        let start = i64::from(page) * 10;
        Ok(StoriesResponse {
            stories: (1..=4)
                .map(|n| StoryWire {
                    id: start + n,
                    title: format!("story {}", start + n),
                    difficulty_estimate: Some(0.4),
                    status: Some("unread".to_string()),
                })
                .collect(),
            has_more: Some(false),
        })
    }

    async fn fetch_story(&self, story_id: i64) -> Result<StoryResponse, RemoteError> {
        self.record(Endpoint::Story, None, serde_json::json!({ "story_id": story_id }))?;
        Ok(StoryResponse {
            id: story_id,
            title: format!("story {story_id}"),
            status: Some("in_progress".to_string()),
            tokens: (0..6)
                .map(|position| TokenWire {
                    position,
                    surface: format!("t{position}"),
                    lemma_id: Some(story_lemma(story_id, position)),
                })
                .collect(),
        })
    }

    async fn lookup_word(&self, text: &str) -> Result<LookupResponse, RemoteError> {
        self.record(Endpoint::LookupWord, None, serde_json::json!({ "text": text }))?;
        Ok(LookupResponse {
            lemma_id: 500 + text.trim().len() as i64,
            lemma_text: text.trim().to_string(),
            gloss_en: Some(format!("meaning of {}", text.trim())),
            pos: Some("noun".to_string()),
        })
    }

    async fn lookup_story_word(
        &self,
        story_id: i64,
        position: u32,
    ) -> Result<LookupResponse, RemoteError> {
        self.record(
            Endpoint::LookupStoryWord,
            None,
            serde_json::json!({ "story_id": story_id, "position": position }),
        )?;
        let lemma_id = story_lemma(story_id, position);
        Ok(LookupResponse {
            lemma_id,
            lemma_text: format!("lemma-{lemma_id}"),
            gloss_en: None,
            pos: None,
        })
    }

    async fn submit_sentence_review(
        &self,
        client_mutation_id: &str,
        payload: &SentenceReviewPayload,
    ) -> Result<(), RemoteError> {
        let gate = self.review_gate.lock().clone();
        if let Some(gate) = gate {
            self.held_reviews.lock().push(client_mutation_id.to_string());
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| RemoteError::Network("gate closed".to_string()))?;
        }
        self.record(Endpoint::SentenceReview, Some(client_mutation_id), to_json(payload))
    }

    async fn submit_word_review(
        &self,
        client_mutation_id: &str,
        payload: &WordReviewPayload,
    ) -> Result<(), RemoteError> {
        self.record(Endpoint::WordReview, Some(client_mutation_id), to_json(payload))
    }

    async fn undo_sentence_review(&self, client_mutation_id: &str) -> Result<(), RemoteError> {
        self.record(Endpoint::UndoReview, Some(client_mutation_id), serde_json::Value::Null)
    }

    async fn submit_quiz_result(
        &self,
        client_mutation_id: &str,
        payload: &QuizResultPayload,
    ) -> Result<(), RemoteError> {
        self.record(Endpoint::QuizResult, Some(client_mutation_id), to_json(payload))
    }

    async fn story_action(
        &self,
        client_mutation_id: &str,
        payload: &StoryActionPayload,
    ) -> Result<(), RemoteError> {
        self.record(Endpoint::StoryAction, Some(client_mutation_id), to_json(payload))
    }

    async fn introduce_word(
        &self,
        client_mutation_id: &str,
        lemma_id: i64,
    ) -> Result<WordDetailResponse, RemoteError> {
        self.record(
            Endpoint::IntroduceWord,
            Some(client_mutation_id),
            serde_json::json!({ "lemma_id": lemma_id }),
        )?;
        Ok(word_detail(lemma_id, "learning"))
    }

    async fn suspend_word(&self, client_mutation_id: &str, lemma_id: i64) -> Result<(), RemoteError> {
        self.record(
            Endpoint::SuspendWord,
            Some(client_mutation_id),
            serde_json::json!({ "lemma_id": lemma_id }),
        )
    }

    async fn flag_content(&self, client_mutation_id: &str, flag: &ContentFlag) -> Result<(), RemoteError> {
        self.record(Endpoint::FlagContent, Some(client_mutation_id), to_json(flag))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn word_detail(lemma_id: i64, status: &str) -> WordDetailResponse {
    WordDetailResponse {
        lemma_id,
        lemma_text: format!("word-{lemma_id}"),
        gloss_en: Some("gloss".to_string()),
        pos: Some("noun".to_string()),
        examples: vec![format!("example for {lemma_id}")],
        status: Some(status.to_string()),
        times_seen: Some(2),
    }
}

/// Retries are immediate and give up after three attempts.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        queue: QueueConfig {
            max_attempts: 3,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
            dead_letter_limit: 100,
        },
        ..SyncConfig::default()
    }
}

pub struct TestHarness {
    pub client: SyncClient,
    pub remote: Arc<MockRemote>,
    pub store: MemoryStore,
}

pub fn harness() -> TestHarness {
    harness_with(test_config())
}

pub fn harness_with(config: SyncConfig) -> TestHarness {
    let store = MemoryStore::new();
    let remote = MockRemote::new();
    let client = SyncClient::new(Arc::new(store.clone()), remote.clone(), &config);
    TestHarness {
        client,
        remote,
        store,
    }
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
