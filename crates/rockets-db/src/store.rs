//! Store traits shared by the `PostgreSQL` and in-memory backends.
//!
//! The processing engine only talks to these traits, so every correctness
//! guarantee it relies on is stated here and upheld by each backend:
//!
//! - `(rocket_id, sequence_number)` identifies at most one event record.
//! - Status updates follow [`EventStatus::predecessor`]; anything else is
//!   [`DbError::InvalidTransition`].
//! - A claim moves each returned record `pending -> processing` atomically,
//!   so concurrent claimers never receive the same record.
//! - [`RocketStore::conditional_upsert`] never lowers
//!   `last_applied_sequence`.

use std::time::Duration;

use async_trait::async_trait;
use rockets_types::{EventRecord, EventRecordId, EventStatus, PendingEvent, Rocket, RocketId, SortKey};

use crate::error::DbError;

/// What an idempotent create did with an incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No record existed for the pair; a pending one was inserted.
    Inserted,
    /// A pending record existed; its type, payload and receipt time were
    /// replaced in place.
    Replaced,
    /// A record existed past `pending` and was left untouched.
    Unchanged(EventStatus),
}

/// Result of [`EventRecordStore::create_or_replace_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Id of the record holding the `(rocket_id, sequence_number)` pair.
    pub id: EventRecordId,
    /// What happened to it.
    pub disposition: Disposition,
}

/// Durable table of received events and their status lifecycle.
#[async_trait]
pub trait EventRecordStore: Send + Sync {
    /// Insert a pending record, or replace the pending record holding the
    /// same `(rocket_id, sequence_number)`.
    ///
    /// Records already past `pending` are not modified; their id is returned
    /// with [`Disposition::Unchanged`].
    async fn create_or_replace_pending(&self, event: &PendingEvent)
    -> Result<UpsertOutcome, DbError>;

    /// Up to `limit` pending records, oldest receipt first.
    ///
    /// Read-only: nothing is claimed.
    async fn fetch_pending_batch(&self, limit: u32) -> Result<Vec<EventRecord>, DbError>;

    /// Claim up to `limit` pending records, oldest receipt first.
    ///
    /// Every returned record has been moved to `processing` with `claimed_at`
    /// set, and no other claimer received it.
    async fn claim_pending_batch(&self, limit: u32) -> Result<Vec<EventRecord>, DbError>;

    /// Move a record to `status`.
    ///
    /// Terminal statuses stamp `processed_at`. `error_message` is stored only
    /// for [`EventStatus::Failed`].
    async fn update_status(
        &self,
        id: EventRecordId,
        status: EventStatus,
        error_message: Option<&str>,
    ) -> Result<(), DbError>;

    /// Look up one record.
    async fn get_by_id(&self, id: EventRecordId) -> Result<Option<EventRecord>, DbError>;

    /// Return records stuck in `processing` for at least `older_than` to
    /// `pending`. Returns how many were reclaimed.
    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, DbError>;
}

/// Durable table of current rocket state.
#[async_trait]
pub trait RocketStore: Send + Sync {
    /// Look up one rocket.
    async fn get(&self, id: &RocketId) -> Result<Option<Rocket>, DbError>;

    /// All rockets, ascending by `sort`, or by `last_updated` descending when
    /// `sort` is `None`. Ties are broken by id.
    async fn list_all(&self, sort: Option<SortKey>) -> Result<Vec<Rocket>, DbError>;

    /// Insert `rocket`, or overwrite the stored row only if
    /// `rocket.last_applied_sequence` is strictly greater.
    ///
    /// Returns whether the write landed. A lost write is not an error.
    async fn conditional_upsert(&self, rocket: &Rocket) -> Result<bool, DbError>;
}
