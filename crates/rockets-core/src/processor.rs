//! Applying one claimed event record to rocket state.
//!
//! [`EventProcessor::process`] is everything a dispatcher worker does per
//! record:
//!
//! 1. Load the rocket's current state.
//! 2. Skip the event if its sequence number is already covered.
//! 3. Decode and reduce it; a [`ReduceError`] fails the record for good.
//! 4. Stamp the sequence number and write the state conditionally.
//! 5. Mark the record `processed`.
//!
//! A store error at any step is returned as-is and the record stays in
//! `processing` until the reclaim sweep hands it back. If the sweep hands a
//! record out while its first worker is still busy, whichever worker
//! finishes second finds it terminal and reports
//! [`ProcessOutcome::AlreadyFinished`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rockets_db::{DbError, EventRecordStore, RocketStore};
use rockets_types::{EventRecord, EventStatus};
use tracing::{debug, info};

use crate::reducer::{self, ReduceError, RocketEvent};

/// Errors that interrupt processing of a record.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// A store call failed; the record is left for a later retry.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: DbError,
    },
}

/// How a record left the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The event advanced the rocket's state.
    Applied,
    /// The event reduced cleanly but a concurrent worker had already
    /// written a newer state.
    Superseded,
    /// The event's sequence number was already applied.
    Skipped,
    /// The event can never be applied.
    Failed(ReduceError),
    /// Another worker moved the record to a terminal status first.
    AlreadyFinished,
}

/// Applies claimed event records to rocket state.
#[derive(Clone)]
pub struct EventProcessor {
    events: Arc<dyn EventRecordStore>,
    rockets: Arc<dyn RocketStore>,
}

impl EventProcessor {
    /// Create a processor over the given stores.
    pub const fn new(events: Arc<dyn EventRecordStore>, rockets: Arc<dyn RocketStore>) -> Self {
        Self { events, rockets }
    }

    /// Process one record that is already `processing`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Store`] if any store call fails. Terminal
    /// event failures are not errors; they come back as
    /// [`ProcessOutcome::Failed`].
    pub async fn process(&self, record: &EventRecord) -> Result<ProcessOutcome, ProcessError> {
        let started = Instant::now();
        let outcome = self.apply(record).await?;

        let elapsed = started.elapsed();
        match &outcome {
            ProcessOutcome::Failed(err) => info!(
                event_id = %record.id,
                rocket_id = %record.rocket_id,
                sequence_number = record.sequence_number,
                event_type = %record.event_type,
                %err,
                ?elapsed,
                "Event failed"
            ),
            other => debug!(
                event_id = %record.id,
                rocket_id = %record.rocket_id,
                sequence_number = record.sequence_number,
                event_type = %record.event_type,
                outcome = ?other,
                ?elapsed,
                "Event processed"
            ),
        }
        Ok(outcome)
    }

    async fn apply(&self, record: &EventRecord) -> Result<ProcessOutcome, ProcessError> {
        let current = self.rockets.get(&record.rocket_id).await?;

        if current
            .as_ref()
            .is_some_and(|rocket| rocket.has_applied(record.sequence_number))
        {
            return Ok(if self.finish(record, EventStatus::Processed, None).await? {
                ProcessOutcome::Skipped
            } else {
                ProcessOutcome::AlreadyFinished
            });
        }

        let now = Utc::now();
        let reduced = RocketEvent::decode(&record.event_type, &record.payload)
            .and_then(|event| reducer::reduce(current.as_ref(), &record.rocket_id, &event, now));

        let mut next = match reduced {
            Ok(next) => next,
            Err(err) => {
                let reason = err.to_string();
                return Ok(if self.finish(record, EventStatus::Failed, Some(&reason)).await? {
                    ProcessOutcome::Failed(err)
                } else {
                    ProcessOutcome::AlreadyFinished
                });
            }
        };

        next.last_applied_sequence = record.sequence_number;
        next.last_updated = now;
        let written = self.rockets.conditional_upsert(&next).await?;

        let finished = self.finish(record, EventStatus::Processed, None).await?;
        Ok(match (finished, written) {
            (false, _) => ProcessOutcome::AlreadyFinished,
            (true, true) => ProcessOutcome::Applied,
            (true, false) => ProcessOutcome::Superseded,
        })
    }

    /// Move the record to a terminal status. Returns `false` if it was
    /// already terminal.
    async fn finish(
        &self,
        record: &EventRecord,
        status: EventStatus,
        error_message: Option<&str>,
    ) -> Result<bool, DbError> {
        match self.events.update_status(record.id, status, error_message).await {
            Ok(()) => Ok(true),
            Err(DbError::InvalidTransition { from, .. }) if from.is_terminal() => {
                debug!(
                    event_id = %record.id,
                    rocket_id = %record.rocket_id,
                    %from,
                    "Event already finished by another worker"
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use rockets_db::InMemoryStore;
    use rockets_types::{PendingEvent, Rocket, RocketId, RocketStatus, SortKey};
    use serde_json::json;

    use super::*;

    /// Rocket store that lets `winner` land just before every conditional
    /// write, as a faster worker would.
    struct RacingRockets {
        inner: InMemoryStore,
        winner: Rocket,
    }

    #[async_trait]
    impl RocketStore for RacingRockets {
        async fn get(&self, id: &RocketId) -> Result<Option<Rocket>, DbError> {
            self.inner.get(id).await
        }

        async fn list_all(&self, sort: Option<SortKey>) -> Result<Vec<Rocket>, DbError> {
            self.inner.list_all(sort).await
        }

        async fn conditional_upsert(&self, rocket: &Rocket) -> Result<bool, DbError> {
            self.inner.conditional_upsert(&self.winner).await?;
            self.inner.conditional_upsert(rocket).await
        }
    }

    struct Harness {
        store: InMemoryStore,
        processor: EventProcessor,
    }

    impl Harness {
        fn new() -> Self {
            let store = InMemoryStore::new();
            let processor = EventProcessor::new(Arc::new(store.clone()), Arc::new(store.clone()));
            Self { store, processor }
        }

        /// Ingest and claim one event, returning the claimed record.
        async fn claim(&self, seq: i64, tag: &str, payload: serde_json::Value) -> EventRecord {
            self.store
                .create_or_replace_pending(&PendingEvent {
                    rocket_id: RocketId::from("r-1"),
                    sequence_number: seq,
                    event_type: tag.to_owned(),
                    payload,
                    received_at: Utc::now(),
                })
                .await
                .unwrap();
            self.store.claim_pending_batch(1).await.unwrap().remove(0)
        }

        async fn rocket(&self) -> Option<Rocket> {
            self.store.get(&RocketId::from("r-1")).await.unwrap()
        }

        async fn status(&self, record: &EventRecord) -> EventStatus {
            self.store.get_by_id(record.id).await.unwrap().unwrap().status
        }
    }

    #[tokio::test]
    async fn applied_event_stamps_sequence_and_marks_processed() {
        let h = Harness::new();
        let record = h
            .claim(
                1,
                "RocketLaunched",
                json!({"type": "Falcon-9", "launchSpeed": 500, "mission": "ARTEMIS"}),
            )
            .await;

        assert_eq!(h.processor.process(&record).await.unwrap(), ProcessOutcome::Applied);
        let rocket = h.rocket().await.unwrap();
        assert_eq!(rocket.last_applied_sequence, 1);
        assert_eq!(rocket.current_speed, 500);
        assert_eq!(h.status(&record).await, EventStatus::Processed);
    }

    #[tokio::test]
    async fn covered_sequence_is_skipped() {
        let h = Harness::new();
        let mut newer = Rocket::new(RocketId::from("r-1"), Utc::now());
        newer.current_speed = 800;
        newer.last_applied_sequence = 2;
        h.store.conditional_upsert(&newer).await.unwrap();

        let record = h.claim(1, "RocketSpeedIncreased", json!({"by": 1})).await;
        assert_eq!(h.processor.process(&record).await.unwrap(), ProcessOutcome::Skipped);
        assert_eq!(h.rocket().await.unwrap(), newer);
        assert_eq!(h.status(&record).await, EventStatus::Processed);
    }

    #[tokio::test]
    async fn terminal_failure_marks_failed_and_leaves_rocket() {
        let h = Harness::new();
        let record = h.claim(1, "RocketSpeedIncreased", json!({"by": "lots"})).await;

        let outcome = h.processor.process(&record).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Failed(ReduceError::MalformedPayload { .. })
        ));
        assert!(h.rocket().await.is_none());

        let stored = h.store.get_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Failed);
        assert!(stored.error_message.unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn store_failure_leaves_record_processing() {
        let h = Harness::new();
        let record = h.claim(1, "RocketExploded", json!({"reason": "x"})).await;
        h.store.fail_next_upserts(1).await;

        assert!(matches!(
            h.processor.process(&record).await,
            Err(ProcessError::Store { .. })
        ));
        assert_eq!(h.status(&record).await, EventStatus::Processing);
        assert!(h.rocket().await.is_none());
    }

    #[tokio::test]
    async fn exploded_rocket_reports_reason() {
        let h = Harness::new();
        let record = h
            .claim(3, "RocketExploded", json!({"reason": "PRESSURE_VESSEL_FAILURE"}))
            .await;
        h.processor.process(&record).await.unwrap();

        let rocket = h.rocket().await.unwrap();
        assert_eq!(rocket.status, RocketStatus::Exploded);
        assert_eq!(rocket.last_applied_sequence, 3);
    }

    #[tokio::test]
    async fn lost_conditional_write_is_superseded() {
        let h = Harness::new();
        let mut winner = Rocket::new(RocketId::from("r-1"), Utc::now());
        winner.mission = "ARTEMIS".to_owned();
        winner.current_speed = 900;
        winner.last_applied_sequence = 5;
        let processor = EventProcessor::new(
            Arc::new(h.store.clone()),
            Arc::new(RacingRockets {
                inner: h.store.clone(),
                winner: winner.clone(),
            }),
        );

        let record = h
            .claim(
                2,
                "RocketLaunched",
                json!({"type": "Falcon-9", "launchSpeed": 500, "mission": "GEMINI"}),
            )
            .await;
        assert_eq!(processor.process(&record).await.unwrap(), ProcessOutcome::Superseded);
        assert_eq!(h.status(&record).await, EventStatus::Processed);
        assert_eq!(h.rocket().await.unwrap(), winner);
    }

    #[tokio::test]
    async fn record_finished_by_another_worker_is_not_an_error() {
        let h = Harness::new();
        let first = h.claim(1, "RocketExploded", json!({"reason": "x"})).await;

        // The sweep hands the record out again while the first worker holds it.
        assert_eq!(h.store.reclaim_stale(Duration::ZERO).await.unwrap(), 1);
        let second = h.store.claim_pending_batch(1).await.unwrap().remove(0);
        assert_eq!(first.id, second.id);

        assert_eq!(h.processor.process(&first).await.unwrap(), ProcessOutcome::Applied);
        assert_eq!(
            h.processor.process(&second).await.unwrap(),
            ProcessOutcome::AlreadyFinished
        );
        assert_eq!(h.status(&first).await, EventStatus::Processed);
        assert_eq!(h.rocket().await.unwrap().last_applied_sequence, 1);
    }

    #[tokio::test]
    async fn failed_record_finished_elsewhere_keeps_first_verdict() {
        let h = Harness::new();
        let first = h.claim(1, "RocketSpeedIncreased", json!({"by": -4})).await;
        h.store.reclaim_stale(Duration::ZERO).await.unwrap();
        let second = h.store.claim_pending_batch(1).await.unwrap().remove(0);

        assert!(matches!(
            h.processor.process(&first).await.unwrap(),
            ProcessOutcome::Failed(_)
        ));
        assert_eq!(
            h.processor.process(&second).await.unwrap(),
            ProcessOutcome::AlreadyFinished
        );
        assert_eq!(h.status(&first).await, EventStatus::Failed);
    }
}
