//! Durable, ordered log of pending remote writes.
//!
//! The log lives under one store key as a JSON array in insertion order. Each
//! entry carries the client-generated `client_mutation_id` the server uses to
//! deduplicate repeated deliveries. Enqueueing only touches local storage;
//! delivery happens in [`MutationQueue::flush`], driven by the scheduler.

pub mod mutation;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::remote::{RemoteError, RemoteService};
use crate::store::{get_json, set_json, KeyValueStore, StoreResult};

pub use mutation::Mutation;

pub const QUEUE_KEY: &str = "@sync/mutation-queue";
pub const DEAD_LETTER_KEY: &str = "@sync/dead-letters";

const BACKOFF_JITTER_RATIO: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub client_mutation_id: String,
    pub mutation: Mutation,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueueEntry {
    fn new(client_mutation_id: String, mutation: Mutation) -> Self {
        Self {
            client_mutation_id,
            mutation,
            attempts: 0,
            enqueued_at: Utc::now(),
            last_attempt_at: None,
            next_attempt_at: None,
            last_error: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.mutation.kind()
    }

    pub fn payload(&self) -> serde_json::Value {
        self.mutation.payload_json()
    }

    fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_some_and(|at| at > now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub entry: QueueEntry,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Lifecycle of one mutation: `Created -> Queued -> Flushed | Cancelled`.
/// A failed retryable delivery leaves it `Queued`; a terminal rejection (or
/// exhausting the attempt budget) ends it as `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationState {
    Created,
    Queued,
    Flushed,
    Cancelled,
    Rejected,
}

impl MutationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MutationState::Flushed | MutationState::Cancelled | MutationState::Rejected
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    pub already_running: bool,
    pub attempted: usize,
    pub sent: usize,
    pub retried: usize,
    pub rejected: usize,
    pub held_back: usize,
    pub dead_lettered: usize,
    pub remaining: usize,
    pub outcomes: Vec<(String, MutationState)>,
}

impl FlushReport {
    pub fn outcome(&self, client_mutation_id: &str) -> Option<MutationState> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == client_mutation_id)
            .map(|(_, state)| *state)
    }
}

enum FailureDisposition {
    Retry { attempts: u32 },
    DeadLettered,
    Gone,
}

struct FlushGuard(Arc<AtomicBool>);

impl Drop for FlushGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// clears the in-flight marker once a delivery is settled or abandoned
struct DeliveryGuard<'a>(&'a watch::Sender<Option<String>>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(None);
    }
}

#[derive(Clone)]
pub struct MutationQueue {
    store: Arc<dyn KeyValueStore>,
    config: QueueConfig,
    // serializes whole-log read-modify-write inside this process
    write_lock: Arc<Mutex<()>>,
    flushing: Arc<AtomicBool>,
    // id being delivered right now; set and checked under the write lock
    in_flight: Arc<watch::Sender<Option<String>>>,
}

impl MutationQueue {
    pub fn new(store: Arc<dyn KeyValueStore>, config: QueueConfig) -> Self {
        let (in_flight, _) = watch::channel(None);
        Self {
            store,
            config,
            write_lock: Arc::new(Mutex::new(())),
            flushing: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(in_flight),
        }
    }

    /// Appends a mutation and returns its id. If `client_mutation_id` is
    /// already queued the call is a no-op and returns the same id.
    pub async fn enqueue(
        &self,
        mutation: Mutation,
        client_mutation_id: Option<String>,
    ) -> StoreResult<String> {
        let id = client_mutation_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let _lock = self.write_lock.lock().await;
        let mut log = self.load().await?;

        if log.iter().any(|e| e.client_mutation_id == id) {
            debug!(client_mutation_id = %id, "mutation already queued");
            return Ok(id);
        }

        let kind = mutation.kind();
        log.push(QueueEntry::new(id.clone(), mutation));
        self.save(&log).await?;

        debug!(client_mutation_id = %id, kind, pending = log.len(), "mutation queued");
        Ok(id)
    }

    /// Removes a queued mutation. Returns `false` when nothing matched or the
    /// store could not be read; never errors.
    pub async fn remove_from_queue(&self, client_mutation_id: &str) -> bool {
        let _lock = self.write_lock.lock().await;
        self.remove_logged(client_mutation_id).await
    }

    /// Withdraws a mutation so it is never sent.
    ///
    /// If a flush is delivering this very id, waits for that delivery to
    /// settle first. Returns `true` only when the entry was removed unsent;
    /// a mutation that reached the server yields `false`.
    pub async fn cancel(&self, client_mutation_id: &str) -> bool {
        loop {
            let mut in_flight = {
                let _lock = self.write_lock.lock().await;
                if self.in_flight.borrow().as_deref() != Some(client_mutation_id) {
                    return self.remove_logged(client_mutation_id).await;
                }
                self.in_flight.subscribe()
            };

            debug!(client_mutation_id, "waiting for in-flight delivery");
            let _ = in_flight
                .wait_for(|current| current.as_deref() != Some(client_mutation_id))
                .await;
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.entries().await.len()
    }

    pub async fn entries(&self) -> Vec<QueueEntry> {
        match self.load().await {
            Ok(log) => log,
            Err(err) => {
                warn!(error = %err, "failed to read mutation queue");
                Vec::new()
            }
        }
    }

    pub async fn contains(&self, client_mutation_id: &str) -> bool {
        self.entries()
            .await
            .iter()
            .any(|e| e.client_mutation_id == client_mutation_id)
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        match get_json::<Vec<DeadLetter>>(self.store.as_ref(), DEAD_LETTER_KEY).await {
            Ok(letters) => letters.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "failed to read dead-letter log");
                Vec::new()
            }
        }
    }

    pub async fn clear_dead_letters(&self) -> StoreResult<()> {
        let _lock = self.write_lock.lock().await;
        self.store.remove(DEAD_LETTER_KEY).await
    }

    /// One delivery pass over the log, oldest first.
    ///
    /// A failing entry holds back later entries with the same ordering key for
    /// the rest of the pass; unrelated entries are still attempted. Only one
    /// pass runs at a time; a concurrent call returns immediately with
    /// `already_running` set.
    pub async fn flush(&self, remote: &dyn RemoteService) -> FlushReport {
        if self.flushing.swap(true, Ordering::AcqRel) {
            return FlushReport {
                already_running: true,
                ..FlushReport::default()
            };
        }
        let _guard = FlushGuard(Arc::clone(&self.flushing));

        let mut report = FlushReport::default();
        let mut blocked: HashSet<String> = HashSet::new();
        let now = Utc::now();

        for entry in self.entries().await {
            let id = entry.client_mutation_id.clone();
            let ordering_key = entry.mutation.ordering_key();

            if blocked.contains(&ordering_key) || entry.is_backing_off(now) {
                blocked.insert(ordering_key);
                report.held_back += 1;
                continue;
            }

            // an undo may have cancelled it while an earlier entry was in flight
            let Some(_delivering) = self.begin_delivery(&id).await else {
                report.outcomes.push((id, MutationState::Cancelled));
                continue;
            };

            report.attempted += 1;
            match entry.mutation.deliver(remote, &id).await {
                Ok(()) => {
                    match self.remove_entry(&id).await {
                        Ok(true) => {}
                        Ok(false) => debug!(client_mutation_id = %id, "delivered mutation already left the queue"),
                        Err(err) => {
                            warn!(client_mutation_id = %id, error = %err, "delivered mutation could not be removed; it will be re-sent")
                        }
                    }
                    report.sent += 1;
                    report.outcomes.push((id, MutationState::Flushed));
                }
                Err(err) if err.is_retryable() => {
                    match self.record_failure(&id, &err).await {
                        FailureDisposition::Retry { attempts } => {
                            debug!(client_mutation_id = %id, attempts, error = %err, "mutation delivery failed, will retry");
                            blocked.insert(ordering_key);
                            report.retried += 1;
                            report.outcomes.push((id, MutationState::Queued));
                        }
                        FailureDisposition::DeadLettered => {
                            report.dead_lettered += 1;
                            report.outcomes.push((id, MutationState::Rejected));
                        }
                        FailureDisposition::Gone => {
                            report.outcomes.push((id, MutationState::Cancelled));
                        }
                    }
                }
                Err(err) => {
                    warn!(client_mutation_id = %id, kind = entry.kind(), error = %err, "mutation rejected by server, dropping");
                    self.dead_letter(&id, format!("rejected: {err}")).await;
                    report.rejected += 1;
                    report.outcomes.push((id, MutationState::Rejected));
                }
            }
        }

        report.remaining = self.pending_count().await;

        if report.attempted > 0 || report.held_back > 0 {
            info!(
                attempted = report.attempted,
                sent = report.sent,
                retried = report.retried,
                rejected = report.rejected,
                dead_lettered = report.dead_lettered,
                held_back = report.held_back,
                remaining = report.remaining,
                "mutation queue flushed"
            );
        }

        report
    }

    /// Marks `client_mutation_id` as in flight if it is still queued.
    async fn begin_delivery(&self, client_mutation_id: &str) -> Option<DeliveryGuard<'_>> {
        let _lock = self.write_lock.lock().await;
        match self.load().await {
            Ok(log) if log.iter().any(|e| e.client_mutation_id == client_mutation_id) => {
                self.in_flight.send_replace(Some(client_mutation_id.to_string()));
                Some(DeliveryGuard(self.in_flight.as_ref()))
            }
            Ok(_) => None,
            Err(err) => {
                warn!(client_mutation_id, error = %err, "failed to read mutation queue");
                None
            }
        }
    }

    async fn remove_entry(&self, client_mutation_id: &str) -> StoreResult<bool> {
        let _lock = self.write_lock.lock().await;
        self.remove_locked(client_mutation_id).await
    }

    // caller holds the write lock
    async fn remove_locked(&self, client_mutation_id: &str) -> StoreResult<bool> {
        let mut log = self.load().await?;
        let before = log.len();
        log.retain(|e| e.client_mutation_id != client_mutation_id);
        if log.len() == before {
            return Ok(false);
        }
        self.save(&log).await?;
        Ok(true)
    }

    // caller holds the write lock
    async fn remove_logged(&self, client_mutation_id: &str) -> bool {
        match self.remove_locked(client_mutation_id).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(client_mutation_id, error = %err, "failed to update mutation queue");
                false
            }
        }
    }

    async fn record_failure(&self, client_mutation_id: &str, err: &RemoteError) -> FailureDisposition {
        let _lock = self.write_lock.lock().await;
        let mut log = match self.load().await {
            Ok(log) => log,
            Err(store_err) => {
                warn!(client_mutation_id, error = %store_err, "failed to read mutation queue");
                return FailureDisposition::Retry { attempts: 0 };
            }
        };

        let Some(index) = log.iter().position(|e| e.client_mutation_id == client_mutation_id) else {
            return FailureDisposition::Gone;
        };

        let now = Utc::now();
        let attempts = {
            let entry = &mut log[index];
            entry.attempts = entry.attempts.saturating_add(1);
            entry.last_attempt_at = Some(now);
            entry.last_error = Some(err.to_string());
            let delay = backoff_delay(entry.attempts, self.config.backoff_base, self.config.backoff_max);
            entry.next_attempt_at = chrono::Duration::from_std(delay).ok().map(|d| now + d);
            entry.attempts
        };

        if attempts >= self.config.max_attempts {
            let entry = log.remove(index);
            warn!(client_mutation_id, attempts, kind = entry.kind(), error = %err, "mutation exhausted its attempts, dropping");
            if let Err(store_err) = self.save(&log).await {
                warn!(client_mutation_id, error = %store_err, "failed to persist mutation queue");
                return FailureDisposition::Retry { attempts };
            }
            self.append_dead_letter(entry, format!("max attempts reached: {err}")).await;
            return FailureDisposition::DeadLettered;
        }

        if let Err(store_err) = self.save(&log).await {
            warn!(client_mutation_id, error = %store_err, "failed to persist retry bookkeeping");
        }
        FailureDisposition::Retry { attempts }
    }

    async fn dead_letter(&self, client_mutation_id: &str, reason: String) {
        let _lock = self.write_lock.lock().await;
        let mut log = match self.load().await {
            Ok(log) => log,
            Err(err) => {
                warn!(client_mutation_id, error = %err, "failed to read mutation queue");
                return;
            }
        };

        let Some(index) = log.iter().position(|e| e.client_mutation_id == client_mutation_id) else {
            return;
        };
        let entry = log.remove(index);

        if let Err(err) = self.save(&log).await {
            warn!(client_mutation_id, error = %err, "failed to persist mutation queue");
            return;
        }
        self.append_dead_letter(entry, reason).await;
    }

    // caller holds the write lock
    async fn append_dead_letter(&self, entry: QueueEntry, reason: String) {
        let mut letters = self.dead_letters().await;
        letters.push(DeadLetter {
            entry,
            reason,
            dead_lettered_at: Utc::now(),
        });

        let limit = self.config.dead_letter_limit.max(1);
        if letters.len() > limit {
            let overflow = letters.len() - limit;
            letters.drain(..overflow);
        }

        if let Err(err) = set_json(self.store.as_ref(), DEAD_LETTER_KEY, &letters).await {
            warn!(error = %err, "failed to persist dead-letter log");
        }
    }

    async fn load(&self) -> StoreResult<Vec<QueueEntry>> {
        Ok(get_json::<Vec<QueueEntry>>(self.store.as_ref(), QUEUE_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, log: &[QueueEntry]) -> StoreResult<()> {
        set_json(self.store.as_ref(), QUEUE_KEY, log).await
    }
}

/// Capped exponential backoff with +/-10% jitter.
pub fn backoff_delay(attempts: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1).min(20);
    let raw = base.saturating_mul(1u32 << exponent).min(max);
    apply_jitter(raw).min(max)
}

fn apply_jitter(delay: Duration) -> Duration {
    let base_ms = delay.as_millis() as f64;
    if base_ms < 1.0 {
        return delay;
    }
    let mut rng = rand::rng();
    let factor = rng.random_range(1.0 - BACKOFF_JITTER_RATIO..=1.0 + BACKOFF_JITTER_RATIO);
    Duration::from_millis((base_ms * factor).round().max(1.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_millis(1_000);
        let max = Duration::from_millis(10_000);

        let first = backoff_delay(1, base, max);
        assert!(first >= Duration::from_millis(900) && first <= Duration::from_millis(1_100));

        let third = backoff_delay(3, base, max);
        assert!(third >= Duration::from_millis(3_600) && third <= Duration::from_millis(4_400));

        assert!(backoff_delay(30, base, max) <= max);
        assert!(backoff_delay(30, base, max) >= Duration::from_millis(9_000));
    }

    #[test]
    fn test_zero_base_backoff_is_immediate() {
        assert_eq!(backoff_delay(5, Duration::ZERO, Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!MutationState::Created.is_terminal());
        assert!(!MutationState::Queued.is_terminal());
        assert!(MutationState::Flushed.is_terminal());
        assert!(MutationState::Cancelled.is_terminal());
        assert!(MutationState::Rejected.is_terminal());
    }
}
