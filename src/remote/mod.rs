pub mod http;
pub mod wire;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ContentFlag, ReviewMode};
use crate::queue::mutation::{
    QuizResultPayload, SentenceReviewPayload, StoryActionPayload, WordReviewPayload,
};

pub use http::HttpRemote;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },
    #[error("response decode failed: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            code: String::new(),
            message: message.into(),
        }
    }

    /// Transport failures, timeouts, 408, 429 and 5xx are worth retrying.
    /// Everything else means the server looked at the request and refused it.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => true,
            RemoteError::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            RemoteError::Decode(_) => false,
        }
    }
}

/// The remote authority. Read methods return raw wire shapes; the client maps
/// them. Every mutating method carries the client-generated idempotency id.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn fetch_words(&self, page: u32) -> Result<wire::WordsResponse, RemoteError>;

    async fn fetch_word_detail(&self, lemma_id: i64) -> Result<wire::WordDetailResponse, RemoteError>;

    async fn fetch_stats(&self) -> Result<wire::StatsResponse, RemoteError>;

    async fn fetch_session(&self, mode: ReviewMode) -> Result<wire::SessionResponse, RemoteError>;

    async fn fetch_stories(&self, page: u32) -> Result<wire::StoriesResponse, RemoteError>;

    async fn fetch_story(&self, story_id: i64) -> Result<wire::StoryResponse, RemoteError>;

    async fn lookup_word(&self, text: &str) -> Result<wire::LookupResponse, RemoteError>;

    async fn lookup_story_word(
        &self,
        story_id: i64,
        position: u32,
    ) -> Result<wire::LookupResponse, RemoteError>;

    async fn submit_sentence_review(
        &self,
        client_mutation_id: &str,
        payload: &SentenceReviewPayload,
    ) -> Result<(), RemoteError>;

    async fn submit_word_review(
        &self,
        client_mutation_id: &str,
        payload: &WordReviewPayload,
    ) -> Result<(), RemoteError>;

    async fn undo_sentence_review(&self, client_mutation_id: &str) -> Result<(), RemoteError>;

    async fn submit_quiz_result(
        &self,
        client_mutation_id: &str,
        payload: &QuizResultPayload,
    ) -> Result<(), RemoteError>;

    async fn story_action(
        &self,
        client_mutation_id: &str,
        payload: &StoryActionPayload,
    ) -> Result<(), RemoteError>;

    async fn introduce_word(
        &self,
        client_mutation_id: &str,
        lemma_id: i64,
    ) -> Result<wire::WordDetailResponse, RemoteError>;

    async fn suspend_word(&self, client_mutation_id: &str, lemma_id: i64) -> Result<(), RemoteError>;

    async fn flag_content(&self, client_mutation_id: &str, flag: &ContentFlag) -> Result<(), RemoteError>;
}
