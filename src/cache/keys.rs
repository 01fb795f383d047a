use crate::models::ReviewMode;

pub const CACHE_INDEX_KEY: &str = "@cache/index";

/// Sessions kept per review mode, latest first.
pub const MAX_CACHED_SESSIONS: usize = 5;

pub fn words_key(page: u32) -> String {
    format!("@cache/words:{}", page)
}

pub fn word_detail_key(lemma_id: i64) -> String {
    format!("@cache/word:{}", lemma_id)
}

pub fn stats_key() -> &'static str {
    "@cache/stats"
}

pub fn stories_key(page: u32) -> String {
    format!("@cache/stories:{}", page)
}

pub fn story_key(story_id: i64) -> String {
    format!("@cache/story:{}", story_id)
}

pub fn sessions_key(mode: ReviewMode) -> String {
    format!("@cache/sessions:{}", mode.as_str())
}

pub fn word_lookup_key(text: &str) -> String {
    format!("@cache/lookup:{}", normalize_lookup_text(text))
}

pub fn story_word_lookup_key(story_id: i64, position: u32) -> String {
    format!("@cache/story:{}:lookup:{}", story_id, position)
}

pub fn story_lookup_state_key(story_id: i64) -> String {
    format!("@cache/story:{}:lookups", story_id)
}

fn normalize_lookup_text(text: &str) -> String {
    text.trim().to_lowercase()
}
