//! Device-local key-value persistence.
//!
//! Everything the engine keeps on the device goes through [`KeyValueStore`]:
//! the mutation queue, the reviewed ledger, cached resources and story lookup
//! state. Values are plain strings; callers JSON-encode them.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Missing keys resolve to `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn remove(&self, key: &str) -> StoreResult<()>;

    async fn remove_many(&self, keys: &[String]) -> StoreResult<()>;
}

/// Reads and decodes a JSON value. A value that no longer decodes is treated as
/// absent so that a schema change never wedges a reader.
pub async fn get_json<T>(store: &dyn KeyValueStore, key: &str) -> StoreResult<Option<T>>
where
    T: DeserializeOwned,
{
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            tracing::warn!(key, error = %err, "discarding undecodable stored value");
            Ok(None)
        }
    }
}

pub async fn set_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> StoreResult<()>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_string(value)?;
    store.set(key, &payload).await
}
