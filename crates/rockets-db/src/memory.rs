//! In-memory implementation of both store traits.
//!
//! Holds the same invariants as the `PostgreSQL` stores behind a single
//! [`tokio::sync::Mutex`], so every operation is atomic with respect to the
//! others. Used by the engine's tests and for running without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use rockets_types::{EventRecord, EventRecordId, EventStatus, PendingEvent, Rocket, RocketId, SortKey};
use tokio::sync::Mutex;

use crate::error::DbError;
use crate::store::{Disposition, EventRecordStore, RocketStore, UpsertOutcome};

#[derive(Debug, Default)]
struct MemoryState {
    last_event_id: i64,
    events: BTreeMap<EventRecordId, EventRecord>,
    by_pair: HashMap<(RocketId, i64), EventRecordId>,
    rockets: HashMap<RocketId, Rocket>,
    failing_upserts: u32,
}

/// Event record and rocket stores backed by process memory.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to [`RocketStore::conditional_upsert`]
    /// fail with [`DbError::Unavailable`].
    pub async fn fail_next_upserts(&self, count: u32) {
        self.state.lock().await.failing_upserts = count;
    }

    /// Snapshot of every stored event record, in id order.
    pub async fn events(&self) -> Vec<EventRecord> {
        self.state.lock().await.events.values().cloned().collect()
    }
}

#[async_trait]
impl EventRecordStore for InMemoryStore {
    async fn create_or_replace_pending(
        &self,
        event: &PendingEvent,
    ) -> Result<UpsertOutcome, DbError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let key = (event.rocket_id.clone(), event.sequence_number);

        if let Some(&id) = state.by_pair.get(&key) {
            let record = state.events.get_mut(&id).ok_or(DbError::EventNotFound(id))?;
            if record.status != EventStatus::Pending {
                return Ok(UpsertOutcome {
                    id,
                    disposition: Disposition::Unchanged(record.status),
                });
            }
            record.event_type.clone_from(&event.event_type);
            record.payload = event.payload.clone();
            record.received_at = event.received_at;
            return Ok(UpsertOutcome {
                id,
                disposition: Disposition::Replaced,
            });
        }

        state.last_event_id = state.last_event_id.saturating_add(1);
        let id = EventRecordId(state.last_event_id);
        state.events.insert(
            id,
            EventRecord {
                id,
                rocket_id: event.rocket_id.clone(),
                sequence_number: event.sequence_number,
                event_type: event.event_type.clone(),
                payload: event.payload.clone(),
                status: EventStatus::Pending,
                received_at: event.received_at,
                processed_at: None,
                error_message: None,
                claimed_at: None,
            },
        );
        state.by_pair.insert(key, id);
        Ok(UpsertOutcome {
            id,
            disposition: Disposition::Inserted,
        })
    }

    async fn fetch_pending_batch(&self, limit: u32) -> Result<Vec<EventRecord>, DbError> {
        let state = self.state.lock().await;
        Ok(oldest_pending(&state, limit)
            .into_iter()
            .filter_map(|id| state.events.get(&id).cloned())
            .collect())
    }

    async fn claim_pending_batch(&self, limit: u32) -> Result<Vec<EventRecord>, DbError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let ids = oldest_pending(&state, limit);

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = state.events.get_mut(&id) {
                record.status = EventStatus::Processing;
                record.claimed_at = Some(now);
                claimed.push(record.clone());
            }
        }
        Ok(claimed)
    }

    async fn update_status(
        &self,
        id: EventRecordId,
        status: EventStatus,
        error_message: Option<&str>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let record = state.events.get_mut(&id).ok_or(DbError::EventNotFound(id))?;

        if !record.status.can_transition_to(status) {
            return Err(DbError::InvalidTransition {
                id,
                from: record.status,
                to: status,
            });
        }

        let now = Utc::now();
        record.status = status;
        record.error_message = if status == EventStatus::Failed {
            error_message.map(str::to_owned)
        } else {
            None
        };
        if status.is_terminal() {
            record.processed_at = Some(now);
        }
        if status == EventStatus::Processing {
            record.claimed_at = Some(now);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: EventRecordId) -> Result<Option<EventRecord>, DbError> {
        Ok(self.state.lock().await.events.get(&id).cloned())
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, DbError> {
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };

        let mut state = self.state.lock().await;
        let mut reclaimed: u64 = 0;
        for record in state.events.values_mut() {
            let stale = record.status == EventStatus::Processing
                && record.claimed_at.is_some_and(|at| at <= cutoff);
            if stale {
                record.status = EventStatus::Pending;
                record.claimed_at = None;
                reclaimed = reclaimed.saturating_add(1);
            }
        }
        Ok(reclaimed)
    }
}

/// Ids of up to `limit` pending records, oldest receipt first, ties by id.
fn oldest_pending(state: &MemoryState, limit: u32) -> Vec<EventRecordId> {
    let mut pending: Vec<&EventRecord> = state
        .events
        .values()
        .filter(|r| r.status == EventStatus::Pending)
        .collect();
    pending.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));
    pending
        .into_iter()
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .map(|r| r.id)
        .collect()
}

#[async_trait]
impl RocketStore for InMemoryStore {
    async fn get(&self, id: &RocketId) -> Result<Option<Rocket>, DbError> {
        Ok(self.state.lock().await.rockets.get(id).cloned())
    }

    async fn list_all(&self, sort: Option<SortKey>) -> Result<Vec<Rocket>, DbError> {
        let state = self.state.lock().await;
        let mut rockets: Vec<Rocket> = state.rockets.values().cloned().collect();
        rockets.sort_by(|a, b| {
            let primary = match sort {
                None => b.last_updated.cmp(&a.last_updated),
                Some(SortKey::Kind) => a.kind.cmp(&b.kind),
                Some(SortKey::Speed) => a.current_speed.cmp(&b.current_speed),
                Some(SortKey::Mission) => a.mission.cmp(&b.mission),
                Some(SortKey::Status) => a.status.as_str().cmp(b.status.as_str()),
                Some(SortKey::LaunchTime) => a.launch_time.cmp(&b.launch_time),
                Some(SortKey::LastUpdated) => a.last_updated.cmp(&b.last_updated),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });
        Ok(rockets)
    }

    async fn conditional_upsert(&self, rocket: &Rocket) -> Result<bool, DbError> {
        let mut state = self.state.lock().await;
        if state.failing_upserts > 0 {
            state.failing_upserts = state.failing_upserts.saturating_sub(1);
            return Err(DbError::Unavailable(String::from("injected upsert failure")));
        }

        let newer = state
            .rockets
            .get(&rocket.id)
            .is_none_or(|stored| rocket.last_applied_sequence > stored.last_applied_sequence);
        if newer {
            state.rockets.insert(rocket.id.clone(), rocket.clone());
        }
        Ok(newer)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use chrono::DateTime;
    use rockets_types::RocketStatus;
    use serde_json::json;

    use super::*;

    fn pending(rocket: &str, seq: i64, at: DateTime<Utc>) -> PendingEvent {
        PendingEvent {
            rocket_id: RocketId::from(rocket),
            sequence_number: seq,
            event_type: String::from("RocketSpeedIncreased"),
            payload: json!({ "by": 100 }),
            received_at: at,
        }
    }

    fn rocket_at(seq: i64) -> Rocket {
        let mut rocket = Rocket::new(RocketId::from("r-1"), Utc::now());
        rocket.last_applied_sequence = seq;
        rocket.current_speed = seq.saturating_mul(100);
        rocket
    }

    #[tokio::test]
    async fn same_pair_replaces_pending_record_in_place() {
        let store = InMemoryStore::new();
        let first = store
            .create_or_replace_pending(&pending("r-1", 1, Utc::now()))
            .await
            .unwrap();
        assert_eq!(first.disposition, Disposition::Inserted);

        let mut replay = pending("r-1", 1, Utc::now());
        replay.payload = json!({ "by": 250 });
        let second = store.create_or_replace_pending(&replay).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.disposition, Disposition::Replaced);

        let record = store.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(record.payload, json!({ "by": 250 }));
        assert_eq!(store.events().await.len(), 1);
    }

    #[tokio::test]
    async fn non_pending_record_is_left_untouched() {
        let store = InMemoryStore::new();
        let first = store
            .create_or_replace_pending(&pending("r-1", 1, Utc::now()))
            .await
            .unwrap();
        store.claim_pending_batch(10).await.unwrap();

        let mut replay = pending("r-1", 1, Utc::now());
        replay.payload = json!({ "by": 999 });
        let outcome = store.create_or_replace_pending(&replay).await.unwrap();
        assert_eq!(outcome.id, first.id);
        assert_eq!(
            outcome.disposition,
            Disposition::Unchanged(EventStatus::Processing)
        );

        let record = store.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(record.payload, json!({ "by": 100 }));
    }

    #[tokio::test]
    async fn claim_returns_oldest_first_and_only_once() {
        let store = InMemoryStore::new();
        let base = Utc::now();
        let late = store
            .create_or_replace_pending(&pending("r-1", 2, base + TimeDelta::seconds(5)))
            .await
            .unwrap();
        let early = store
            .create_or_replace_pending(&pending("r-1", 1, base))
            .await
            .unwrap();
        store
            .create_or_replace_pending(&pending("r-2", 1, base + TimeDelta::seconds(9)))
            .await
            .unwrap();

        let peeked = store.fetch_pending_batch(2).await.unwrap();
        assert_eq!(peeked.len(), 2);
        assert!(peeked.iter().all(|r| r.status == EventStatus::Pending));

        let claimed = store.claim_pending_batch(2).await.unwrap();
        let ids: Vec<_> = claimed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
        assert!(claimed.iter().all(|r| r.status == EventStatus::Processing));
        assert!(claimed.iter().all(|r| r.claimed_at.is_some()));

        let rest = store.claim_pending_batch(10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(store.claim_pending_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_updates_follow_the_lifecycle() {
        let store = InMemoryStore::new();
        let id = store
            .create_or_replace_pending(&pending("r-1", 1, Utc::now()))
            .await
            .unwrap()
            .id;

        let err = store
            .update_status(id, EventStatus::Processed, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidTransition {
                from: EventStatus::Pending,
                to: EventStatus::Processed,
                ..
            }
        ));

        store.update_status(id, EventStatus::Processing, None).await.unwrap();
        store
            .update_status(id, EventStatus::Failed, Some("bad payload"))
            .await
            .unwrap();

        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("bad payload"));
        assert!(record.processed_at.is_some());

        assert!(store
            .update_status(id, EventStatus::Processing, None)
            .await
            .is_err());
        assert!(matches!(
            store
                .update_status(EventRecordId(404), EventStatus::Processing, None)
                .await,
            Err(DbError::EventNotFound(_))
        ));
    }

    #[tokio::test]
    async fn processed_records_carry_no_error_message() {
        let store = InMemoryStore::new();
        let id = store
            .create_or_replace_pending(&pending("r-1", 1, Utc::now()))
            .await
            .unwrap()
            .id;
        store.update_status(id, EventStatus::Processing, None).await.unwrap();
        store
            .update_status(id, EventStatus::Processed, Some("ignored"))
            .await
            .unwrap();
        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.error_message, None);
    }

    #[tokio::test]
    async fn reclaim_returns_stale_processing_records() {
        let store = InMemoryStore::new();
        store
            .create_or_replace_pending(&pending("r-1", 1, Utc::now()))
            .await
            .unwrap();
        store.claim_pending_batch(10).await.unwrap();

        assert_eq!(store.reclaim_stale(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(store.reclaim_stale(Duration::ZERO).await.unwrap(), 1);

        let records = store.fetch_pending_batch(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].claimed_at, None);
    }

    #[tokio::test]
    async fn conditional_upsert_only_moves_forward() {
        let store = InMemoryStore::new();
        assert!(store.conditional_upsert(&rocket_at(2)).await.unwrap());
        assert!(!store.conditional_upsert(&rocket_at(1)).await.unwrap());
        assert!(!store.conditional_upsert(&rocket_at(2)).await.unwrap());
        assert!(store.conditional_upsert(&rocket_at(3)).await.unwrap());

        let stored = store.get(&RocketId::from("r-1")).await.unwrap().unwrap();
        assert_eq!(stored.last_applied_sequence, 3);
        assert_eq!(stored.current_speed, 300);
    }

    #[tokio::test]
    async fn injected_upsert_failures_are_consumed() {
        let store = InMemoryStore::new();
        store.fail_next_upserts(1).await;
        assert!(matches!(
            store.conditional_upsert(&rocket_at(1)).await,
            Err(DbError::Unavailable(_))
        ));
        assert!(store.conditional_upsert(&rocket_at(1)).await.unwrap());
    }

    #[tokio::test]
    async fn listing_honors_sort_key_and_default_order() {
        let store = InMemoryStore::new();
        let base = Utc::now();
        for (id, speed, minutes, status) in [
            ("b", 300, 1, RocketStatus::Active),
            ("a", 100, 3, RocketStatus::Exploded),
            ("c", 100, 2, RocketStatus::Active),
        ] {
            let mut rocket = Rocket::new(RocketId::from(id), base);
            rocket.current_speed = speed;
            rocket.status = status;
            rocket.last_updated = base + TimeDelta::minutes(minutes);
            rocket.last_applied_sequence = 1;
            store.conditional_upsert(&rocket).await.unwrap();
        }

        let ids = |rockets: Vec<Rocket>| -> Vec<String> {
            rockets.into_iter().map(|r| r.id.into_inner()).collect()
        };
        assert_eq!(ids(store.list_all(None).await.unwrap()), ["a", "c", "b"]);
        assert_eq!(
            ids(store.list_all(Some(SortKey::Speed)).await.unwrap()),
            ["a", "c", "b"]
        );
        assert_eq!(
            ids(store.list_all(Some(SortKey::Status)).await.unwrap()),
            ["b", "c", "a"]
        );
    }
}
