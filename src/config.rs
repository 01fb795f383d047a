use std::path::PathBuf;
use std::time::Duration;

use crate::store::sqlite::default_store_path;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_FLUSH_SCHEDULE: &str = "*/30 * * * * *";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub remote: RemoteConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub store_path: PathBuf,
    pub prefetch_stories: usize,
    pub log_level: String,
}

impl SyncConfig {
    /// Loads `.env` if present, then reads the environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let store_path = env_string("SYNC_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_store_path);

        Self {
            remote: RemoteConfig::from_env(),
            queue: QueueConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            store_path,
            prefetch_stories: env_u64("SYNC_PREFETCH_STORIES", 3) as usize,
            log_level: env_string("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            queue: QueueConfig::default(),
            scheduler: SchedulerConfig::default(),
            store_path: default_store_path(),
            prefetch_stories: 3,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl RemoteConfig {
    fn from_env() -> Self {
        Self {
            base_url: env_string("DANCI_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            token: env_string("DANCI_API_TOKEN"),
            timeout: Duration::from_millis(env_u64("DANCI_HTTP_TIMEOUT_MS", 15_000)),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_millis(15_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub dead_letter_limit: usize,
}

impl QueueConfig {
    fn from_env() -> Self {
        Self {
            max_attempts: env_u32("SYNC_MAX_ATTEMPTS", 8).max(1),
            backoff_base: Duration::from_millis(env_u64("SYNC_BACKOFF_BASE_MS", 2_000)),
            backoff_max: Duration::from_millis(env_u64("SYNC_BACKOFF_MAX_MS", 300_000)),
            dead_letter_limit: env_u64("SYNC_DEAD_LETTER_LIMIT", 100) as usize,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff_base: Duration::from_millis(2_000),
            backoff_max: Duration::from_millis(300_000),
            dead_letter_limit: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub flush_schedule: String,
}

impl SchedulerConfig {
    fn from_env() -> Self {
        Self {
            flush_schedule: env_string("SYNC_FLUSH_SCHEDULE")
                .unwrap_or_else(|| DEFAULT_FLUSH_SCHEDULE.to_string()),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            flush_schedule: DEFAULT_FLUSH_SCHEDULE.to_string(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.queue.max_attempts, 8);
        assert_eq!(config.scheduler.flush_schedule, "*/30 * * * * *");
        assert_eq!(config.remote.timeout, Duration::from_millis(15_000));
        assert!(config.store_path.ends_with("offline.db"));
    }

    #[test]
    fn test_env_helpers_fall_back_on_garbage() {
        std::env::set_var("DANCI_TEST_GARBAGE_U64", "not-a-number");
        assert_eq!(env_u64("DANCI_TEST_GARBAGE_U64", 7), 7);

        std::env::set_var("DANCI_TEST_BLANK", "   ");
        assert_eq!(env_string("DANCI_TEST_BLANK"), None);
    }
}
