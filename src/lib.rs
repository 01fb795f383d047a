//! Offline-first sync and cache engine for the Danci mobile client.
//!
//! The UI only talks to [`SyncClient`]. Review submissions are written to a
//! durable [`MutationQueue`] and delivered later by [`FlushScheduler`]; reads
//! are served network-first with a fallback to the last cached copy.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod queue;
pub mod remote;
pub mod scheduler;
pub mod store;

pub use cache::{ReadThroughCache, StoryLookupState};
pub use client::{SyncClient, UndoOutcome};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use ledger::{ReviewedKey, ReviewedLedger};
pub use queue::{FlushReport, Mutation, MutationQueue, MutationState, QueueEntry};
pub use remote::{HttpRemote, RemoteError, RemoteService};
pub use scheduler::{FlushScheduler, FlushTrigger};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
