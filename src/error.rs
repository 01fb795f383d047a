use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// True when the failure came from the network path and a retry later may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            _ => false,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
