//! Canonical client-side shapes.
//!
//! These are what the UI receives and what the cache stores. Server responses
//! are decoded into `remote::wire` types first and mapped into these.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    Reading,
    Listening,
}

impl ReviewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewMode::Reading => "reading",
            ReviewMode::Listening => "listening",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reading" => Some(Self::Reading),
            "listening" => Some(Self::Listening),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewRating {
    Again,
    Hard,
    Good,
    Easy,
}

/// One card of a review session. Word-only cards have no sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionItem {
    pub sentence_id: Option<i64>,
    pub lemma_id: i64,
    pub word: String,
    pub gloss: Option<String>,
    pub sentence: Option<String>,
    pub translation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSession {
    pub session_id: String,
    pub mode: ReviewMode,
    pub items: Vec<SessionItem>,
    pub fetched_at: DateTime<Utc>,
}

impl ReviewSession {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordStatus {
    New,
    Learning,
    Known,
    Suspended,
}

impl WordStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "learning" => Self::Learning,
            "known" => Self::Known,
            "suspended" => Self::Suspended,
            _ => Self::New,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub lemma_id: i64,
    pub text: String,
    pub gloss: Option<String>,
    pub status: WordStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordPage {
    pub page: u32,
    pub words: Vec<Word>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordDetail {
    pub lemma_id: i64,
    pub text: String,
    pub gloss: Option<String>,
    pub part_of_speech: Option<String>,
    pub examples: Vec<String>,
    pub status: WordStatus,
    pub times_seen: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub reviews_today: u32,
    pub words_known: u32,
    pub words_learning: u32,
    pub due_count: u32,
    pub streak_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Unread,
    InProgress,
    Completed,
    Skipped,
    TooDifficult,
}

impl StoryStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "skipped" => Self::Skipped,
            "too_difficult" => Self::TooDifficult,
            _ => Self::Unread,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySummary {
    pub story_id: i64,
    pub title: String,
    pub difficulty: Option<f64>,
    pub status: StoryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryPage {
    pub page: u32,
    pub stories: Vec<StorySummary>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryToken {
    pub position: u32,
    pub text: String,
    pub lemma_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDetail {
    pub story_id: i64,
    pub title: String,
    pub tokens: Vec<StoryToken>,
    pub status: StoryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordLookup {
    pub lemma_id: i64,
    pub text: String,
    pub gloss: Option<String>,
    pub part_of_speech: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagTarget {
    Sentence,
    Word,
    Story,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFlag {
    pub target: FlagTarget,
    pub target_id: i64,
    pub reason: String,
}

/// Identity of a review card, as needed to reverse its optimistic effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTarget {
    pub session_id: Option<String>,
    pub sentence_id: Option<i64>,
    pub lemma_id: i64,
    pub mode: ReviewMode,
}
