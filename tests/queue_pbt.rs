//! Property-based tests for the mutation queue and reviewed ledger
//!
//! Invariants:
//! - enqueue grows the log by exactly one and starts at zero attempts
//! - remove_from_queue is true iff the id was present
//! - the log keeps insertion order under arbitrary removals
//! - unmark is idempotent and ignores absent keys

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;

use danci_sync_client::config::QueueConfig;
use danci_sync_client::models::ReviewMode;
use danci_sync_client::queue::mutation::QuizResultPayload;
use danci_sync_client::{MemoryStore, Mutation, MutationQueue, ReviewedLedger};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn quiz(n: u8) -> Mutation {
    Mutation::QuizResult(QuizResultPayload {
        quiz_id: format!("q-{n}"),
        lemma_id: i64::from(n),
        correct: n % 2 == 0,
        answered_at: Utc::now(),
    })
}

fn arb_mode() -> impl Strategy<Value = ReviewMode> {
    prop_oneof![Just(ReviewMode::Reading), Just(ReviewMode::Listening)]
}

#[derive(Debug, Clone)]
struct Mark {
    session_id: Option<String>,
    sentence_id: Option<i64>,
    lemma_id: i64,
    mode: ReviewMode,
}

fn arb_mark() -> impl Strategy<Value = Mark> {
    (
        proptest::option::of("s-[0-9]{1,2}"),
        proptest::option::of(1i64..50),
        1i64..50,
        arb_mode(),
    )
        .prop_map(|(session_id, sentence_id, lemma_id, mode)| Mark {
            session_id,
            sentence_id,
            lemma_id,
            mode,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_enqueue_increments_count(existing in 0usize..8) {
        runtime().block_on(async {
            let queue = MutationQueue::new(Arc::new(MemoryStore::new()), QueueConfig::default());
            for n in 0..existing {
                queue.enqueue(quiz(n as u8), None).await.unwrap();
            }
            let before = queue.pending_count().await;

            let id = queue.enqueue(quiz(99), None).await.unwrap();

            prop_assert_eq!(queue.pending_count().await, before + 1);
            let entries = queue.entries().await;
            let entry = entries.iter().find(|e| e.client_mutation_id == id).unwrap();
            prop_assert_eq!(entry.attempts, 0);
            Ok(())
        })?;
    }

    #[test]
    fn prop_remove_matches_presence(
        ids in proptest::collection::btree_set("m-[a-z]{1,4}", 0..8),
        probes in proptest::collection::vec("m-[a-z]{1,4}", 1..8),
    ) {
        runtime().block_on(async {
            let queue = MutationQueue::new(Arc::new(MemoryStore::new()), QueueConfig::default());
            for (n, id) in ids.iter().enumerate() {
                queue.enqueue(quiz(n as u8), Some(id.clone())).await.unwrap();
            }

            let mut present: BTreeSet<String> = ids.clone();
            for probe in &probes {
                let before = queue.pending_count().await;
                let removed = queue.remove_from_queue(probe).await;
                prop_assert_eq!(removed, present.remove(probe));
                let expected = if removed { before - 1 } else { before };
                prop_assert_eq!(queue.pending_count().await, expected);
            }

            // survivors keep insertion order
            let survivors: Vec<String> = queue
                .entries()
                .await
                .into_iter()
                .map(|e| e.client_mutation_id)
                .collect();
            let expected: Vec<String> = ids.iter().filter(|id| present.contains(*id)).cloned().collect();
            prop_assert_eq!(survivors, expected);
            Ok(())
        })?;
    }

    #[test]
    fn prop_unmark_is_idempotent(marks in proptest::collection::vec(arb_mark(), 0..6), probe in arb_mark()) {
        runtime().block_on(async {
            let ledger = ReviewedLedger::new(Arc::new(MemoryStore::new()));
            for m in &marks {
                ledger
                    .mark_reviewed(m.session_id.as_deref(), m.sentence_id, m.lemma_id, m.mode)
                    .await
                    .unwrap();
            }

            ledger
                .unmark_reviewed(probe.session_id.as_deref(), probe.sentence_id, probe.lemma_id, probe.mode)
                .await
                .unwrap();
            let once = ledger.keys().await;

            ledger
                .unmark_reviewed(probe.session_id.as_deref(), probe.sentence_id, probe.lemma_id, probe.mode)
                .await
                .unwrap();
            prop_assert_eq!(ledger.keys().await, once);
            Ok(())
        })?;
    }

    #[test]
    fn prop_mark_is_idempotent(mark in arb_mark(), repeats in 1usize..4) {
        runtime().block_on(async {
            let ledger = ReviewedLedger::new(Arc::new(MemoryStore::new()));
            ledger
                .mark_reviewed(mark.session_id.as_deref(), mark.sentence_id, mark.lemma_id, mark.mode)
                .await
                .unwrap();
            let once = ledger.keys().await;

            for _ in 0..repeats {
                ledger
                    .mark_reviewed(mark.session_id.as_deref(), mark.sentence_id, mark.lemma_id, mark.mode)
                    .await
                    .unwrap();
            }
            prop_assert_eq!(ledger.keys().await, once);
            Ok(())
        })?;
    }
}
