//! Raw server response shapes and their mapping into `crate::models`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::{
    ReviewMode, ReviewSession, SessionItem, Stats, StoryDetail, StoryPage, StoryStatus,
    StorySummary, StoryToken, Word, WordDetail, WordLookup, WordPage, WordStatus,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionItemWire {
    #[serde(default)]
    pub sentence_id: Option<i64>,
    #[serde(alias = "lemma_id")]
    pub primary_lemma_id: i64,
    pub lemma_text: String,
    #[serde(default)]
    pub gloss_en: Option<String>,
    #[serde(default)]
    pub sentence_text: Option<String>,
    #[serde(default)]
    pub sentence_translation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub items: Vec<SessionItemWire>,
}

impl SessionResponse {
    pub fn into_model(self, requested: ReviewMode) -> ReviewSession {
        let mode = self
            .mode
            .as_deref()
            .and_then(ReviewMode::parse)
            .unwrap_or(requested);

        ReviewSession {
            session_id: self.session_id,
            mode,
            items: self.items.into_iter().map(SessionItem::from).collect(),
            fetched_at: Utc::now(),
        }
    }
}

impl From<SessionItemWire> for SessionItem {
    fn from(item: SessionItemWire) -> Self {
        SessionItem {
            sentence_id: item.sentence_id,
            lemma_id: item.primary_lemma_id,
            word: item.lemma_text,
            gloss: item.gloss_en,
            sentence: item.sentence_text,
            translation: item.sentence_translation,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WordWire {
    pub lemma_id: i64,
    #[serde(alias = "text")]
    pub lemma_text: String,
    #[serde(default)]
    pub gloss_en: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl From<WordWire> for Word {
    fn from(word: WordWire) -> Self {
        Word {
            lemma_id: word.lemma_id,
            text: word.lemma_text,
            gloss: word.gloss_en,
            status: word.status.as_deref().map(WordStatus::parse).unwrap_or(WordStatus::New),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WordsResponse {
    #[serde(default)]
    pub words: Vec<WordWire>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

impl WordsResponse {
    pub fn into_model(self, page: u32) -> WordPage {
        let has_more = self
            .has_more
            .or_else(|| self.total_pages.map(|total| page + 1 < total))
            .unwrap_or(false);

        WordPage {
            page,
            words: self.words.into_iter().map(Word::from).collect(),
            has_more,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WordDetailResponse {
    pub lemma_id: i64,
    pub lemma_text: String,
    #[serde(default)]
    pub gloss_en: Option<String>,
    #[serde(default)]
    pub pos: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub times_seen: Option<u32>,
}

impl From<WordDetailResponse> for WordDetail {
    fn from(detail: WordDetailResponse) -> Self {
        WordDetail {
            lemma_id: detail.lemma_id,
            text: detail.lemma_text,
            gloss: detail.gloss_en,
            part_of_speech: detail.pos,
            examples: detail.examples,
            status: detail.status.as_deref().map(WordStatus::parse).unwrap_or(WordStatus::New),
            times_seen: detail.times_seen.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub reviews_today: u32,
    #[serde(default)]
    pub known_count: u32,
    #[serde(default)]
    pub learning_count: u32,
    #[serde(default)]
    pub due_count: u32,
    #[serde(default)]
    pub streak_days: u32,
}

impl From<StatsResponse> for Stats {
    fn from(stats: StatsResponse) -> Self {
        Stats {
            reviews_today: stats.reviews_today,
            words_known: stats.known_count,
            words_learning: stats.learning_count,
            due_count: stats.due_count,
            streak_days: stats.streak_days,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoryWire {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub difficulty_estimate: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl From<StoryWire> for StorySummary {
    fn from(story: StoryWire) -> Self {
        StorySummary {
            story_id: story.id,
            title: story.title,
            difficulty: story.difficulty_estimate,
            status: story.status.as_deref().map(StoryStatus::parse).unwrap_or(StoryStatus::Unread),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoriesResponse {
    #[serde(default)]
    pub stories: Vec<StoryWire>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

impl StoriesResponse {
    pub fn into_model(self, page: u32) -> StoryPage {
        StoryPage {
            page,
            stories: self.stories.into_iter().map(StorySummary::from).collect(),
            has_more: self.has_more.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenWire {
    pub position: u32,
    pub surface: String,
    #[serde(default)]
    pub lemma_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoryResponse {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tokens: Vec<TokenWire>,
}

impl From<StoryResponse> for StoryDetail {
    fn from(story: StoryResponse) -> Self {
        StoryDetail {
            story_id: story.id,
            title: story.title,
            status: story.status.as_deref().map(StoryStatus::parse).unwrap_or(StoryStatus::Unread),
            tokens: story
                .tokens
                .into_iter()
                .map(|t| StoryToken {
                    position: t.position,
                    text: t.surface,
                    lemma_id: t.lemma_id,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupResponse {
    pub lemma_id: i64,
    pub lemma_text: String,
    #[serde(default)]
    pub gloss_en: Option<String>,
    #[serde(default)]
    pub pos: Option<String>,
}

impl From<LookupResponse> for WordLookup {
    fn from(lookup: LookupResponse) -> Self {
        WordLookup {
            lemma_id: lookup.lemma_id,
            text: lookup.lemma_text,
            gloss: lookup.gloss_en,
            part_of_speech: lookup.pos,
        }
    }
}
