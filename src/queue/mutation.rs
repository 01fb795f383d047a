use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ReviewMode, ReviewRating, ReviewTarget};
use crate::remote::{RemoteError, RemoteService};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceReviewPayload {
    pub sentence_id: i64,
    pub primary_lemma_id: i64,
    pub session_id: Option<String>,
    pub mode: ReviewMode,
    pub rating: ReviewRating,
    pub response_ms: Option<u64>,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordReviewPayload {
    pub lemma_id: i64,
    pub session_id: Option<String>,
    pub mode: ReviewMode,
    pub rating: ReviewRating,
    pub response_ms: Option<u64>,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResultPayload {
    pub quiz_id: String,
    pub lemma_id: i64,
    pub correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoryAction {
    Complete,
    Skip,
    TooDifficult,
}

impl StoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryAction::Complete => "complete",
            StoryAction::Skip => "skip",
            StoryAction::TooDifficult => "too-difficult",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryActionPayload {
    pub story_id: i64,
    pub action: StoryAction,
    pub looked_up_lemma_ids: Vec<i64>,
    pub acted_at: DateTime<Utc>,
}

/// A pending remote write. Adding a variant forces `deliver` and
/// `ordering_key` to handle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Mutation {
    SentenceReview(SentenceReviewPayload),
    WordReview(WordReviewPayload),
    QuizResult(QuizResultPayload),
    StoryAction(StoryActionPayload),
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::SentenceReview(_) => "sentence-review",
            Mutation::WordReview(_) => "word-review",
            Mutation::QuizResult(_) => "quiz-result",
            Mutation::StoryAction(_) => "story-action",
        }
    }

    /// The logical record this mutation writes. Entries sharing a key are
    /// delivered strictly in queue order.
    pub fn ordering_key(&self) -> String {
        match self {
            Mutation::SentenceReview(p) => {
                format!("sentence:{}:{}", p.sentence_id, p.primary_lemma_id)
            }
            Mutation::WordReview(p) => format!("word:{}", p.lemma_id),
            Mutation::QuizResult(p) => format!("quiz:{}", p.quiz_id),
            Mutation::StoryAction(p) => format!("story:{}", p.story_id),
        }
    }

    pub fn review_target(&self) -> Option<ReviewTarget> {
        match self {
            Mutation::SentenceReview(p) => Some(ReviewTarget {
                session_id: p.session_id.clone(),
                sentence_id: Some(p.sentence_id),
                lemma_id: p.primary_lemma_id,
                mode: p.mode,
            }),
            Mutation::WordReview(p) => Some(ReviewTarget {
                session_id: p.session_id.clone(),
                sentence_id: None,
                lemma_id: p.lemma_id,
                mode: p.mode,
            }),
            Mutation::QuizResult(_) | Mutation::StoryAction(_) => None,
        }
    }

    pub fn payload_json(&self) -> serde_json::Value {
        let encoded = match self {
            Mutation::SentenceReview(p) => serde_json::to_value(p),
            Mutation::WordReview(p) => serde_json::to_value(p),
            Mutation::QuizResult(p) => serde_json::to_value(p),
            Mutation::StoryAction(p) => serde_json::to_value(p),
        };
        encoded.unwrap_or(serde_json::Value::Null)
    }

    pub async fn deliver(
        &self,
        remote: &dyn RemoteService,
        client_mutation_id: &str,
    ) -> Result<(), RemoteError> {
        match self {
            Mutation::SentenceReview(p) => remote.submit_sentence_review(client_mutation_id, p).await,
            Mutation::WordReview(p) => remote.submit_word_review(client_mutation_id, p).await,
            Mutation::QuizResult(p) => remote.submit_quiz_result(client_mutation_id, p).await,
            Mutation::StoryAction(p) => remote.story_action(client_mutation_id, p).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence_review() -> Mutation {
        Mutation::SentenceReview(SentenceReviewPayload {
            sentence_id: 10,
            primary_lemma_id: 42,
            session_id: Some("s-1".to_string()),
            mode: ReviewMode::Reading,
            rating: ReviewRating::Good,
            response_ms: Some(1200),
            reviewed_at: Utc::now(),
        })
    }

    #[test]
    fn test_tagged_encoding() {
        let json = serde_json::to_value(sentence_review()).unwrap();
        assert_eq!(json["type"], "sentence-review");
        assert_eq!(json["payload"]["sentence_id"], 10);
        assert_eq!(json["payload"]["mode"], "reading");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = r#"{"type":"teleport","payload":{}}"#;
        assert!(serde_json::from_str::<Mutation>(raw).is_err());
    }

    #[test]
    fn test_ordering_keys() {
        assert_eq!(sentence_review().ordering_key(), "sentence:10:42");

        let story = Mutation::StoryAction(StoryActionPayload {
            story_id: 7,
            action: StoryAction::TooDifficult,
            looked_up_lemma_ids: vec![],
            acted_at: Utc::now(),
        });
        assert_eq!(story.ordering_key(), "story:7");
        assert_eq!(story.kind(), "story-action");
        assert!(story.review_target().is_none());
    }

    #[test]
    fn test_review_target_from_sentence_review() {
        let target = sentence_review().review_target().unwrap();
        assert_eq!(target.sentence_id, Some(10));
        assert_eq!(target.lemma_id, 42);
        assert_eq!(target.session_id.as_deref(), Some("s-1"));
    }
}
