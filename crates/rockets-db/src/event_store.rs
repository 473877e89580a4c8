//! `PostgreSQL` implementation of [`EventRecordStore`].
//!
//! Every received event lands in `rocket_events` as a pending row and is
//! walked through its lifecycle by the dispatcher. All lifecycle checks are
//! expressed as conditional SQL so they hold across processes, not just
//! across tasks.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rockets_types::{EventRecord, EventRecordId, EventStatus, PendingEvent, RocketId};
use sqlx::PgPool;

use crate::error::DbError;
use crate::store::{Disposition, EventRecordStore, UpsertOutcome};

/// Column list shared by every query that returns full rows.
const EVENT_COLUMNS: &str = "id, rocket_id, sequence_number, event_type, payload, status, \
                             received_at, processed_at, error_message, claimed_at";

/// Operations on the `rocket_events` table.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Create a new event store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explain why a conditional status update matched no row.
    async fn transition_failure(&self, id: EventRecordId, to: EventStatus) -> DbError {
        let current = sqlx::query_scalar::<_, String>("SELECT status FROM rocket_events WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await;

        match current {
            Ok(Some(status)) => match status.parse::<EventStatus>() {
                Ok(from) => DbError::InvalidTransition { id, from, to },
                Err(e) => DbError::Corrupt(e),
            },
            Ok(None) => DbError::EventNotFound(id),
            Err(e) => DbError::Postgres(e),
        }
    }
}

#[async_trait]
impl EventRecordStore for PgEventStore {
    async fn create_or_replace_pending(
        &self,
        event: &PendingEvent,
    ) -> Result<UpsertOutcome, DbError> {
        // The WHERE on the conflict arm turns the upsert into a no-op for
        // rows that have left `pending`; RETURNING then yields nothing.
        let written = sqlx::query_as::<_, (i64, bool)>(
            r"INSERT INTO rocket_events (rocket_id, sequence_number, event_type, payload, status, received_at)
              VALUES ($1, $2, $3, $4, 'pending', $5)
              ON CONFLICT (rocket_id, sequence_number) DO UPDATE SET
                event_type = EXCLUDED.event_type,
                payload = EXCLUDED.payload,
                received_at = EXCLUDED.received_at
              WHERE rocket_events.status = 'pending'
              RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(event.rocket_id.as_str())
        .bind(event.sequence_number)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.received_at)
        .fetch_optional(&self.pool)
        .await?;

        let outcome = if let Some((id, inserted)) = written {
            UpsertOutcome {
                id: EventRecordId(id),
                disposition: if inserted {
                    Disposition::Inserted
                } else {
                    Disposition::Replaced
                },
            }
        } else {
            let (id, status) = sqlx::query_as::<_, (i64, String)>(
                r"SELECT id, status FROM rocket_events
                  WHERE rocket_id = $1 AND sequence_number = $2",
            )
            .bind(event.rocket_id.as_str())
            .bind(event.sequence_number)
            .fetch_one(&self.pool)
            .await?;
            UpsertOutcome {
                id: EventRecordId(id),
                disposition: Disposition::Unchanged(status.parse()?),
            }
        };

        tracing::debug!(
            event_id = %outcome.id,
            rocket_id = %event.rocket_id,
            sequence_number = event.sequence_number,
            disposition = ?outcome.disposition,
            "Stored event record"
        );
        Ok(outcome)
    }

    async fn fetch_pending_batch(&self, limit: u32) -> Result<Vec<EventRecord>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r"SELECT {EVENT_COLUMNS}
              FROM rocket_events
              WHERE status = 'pending'
              ORDER BY received_at, id
              LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRecord::try_from).collect()
    }

    async fn claim_pending_batch(&self, limit: u32) -> Result<Vec<EventRecord>, DbError> {
        // SKIP LOCKED lets concurrent claimers split the backlog instead of
        // blocking on (or double-claiming) the same rows.
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r"UPDATE rocket_events
              SET status = 'processing', claimed_at = now()
              WHERE id IN (
                  SELECT id FROM rocket_events
                  WHERE status = 'pending'
                  ORDER BY received_at, id
                  LIMIT $1
                  FOR UPDATE SKIP LOCKED
              )
              RETURNING {EVENT_COLUMNS}"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        // RETURNING does not preserve the subquery order.
        let mut records = rows
            .into_iter()
            .map(EventRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));

        if !records.is_empty() {
            tracing::debug!(count = records.len(), "Claimed pending events");
        }
        Ok(records)
    }

    async fn update_status(
        &self,
        id: EventRecordId,
        status: EventStatus,
        error_message: Option<&str>,
    ) -> Result<(), DbError> {
        let Some(from) = status.predecessor() else {
            return Err(self.transition_failure(id, status).await);
        };
        let error_message = if status == EventStatus::Failed {
            error_message
        } else {
            None
        };

        let result = sqlx::query(
            r"UPDATE rocket_events
              SET status = $2,
                  error_message = $3,
                  processed_at = CASE WHEN $4 THEN now() ELSE processed_at END,
                  claimed_at = CASE WHEN $2 = 'processing' THEN now() ELSE claimed_at END
              WHERE id = $1 AND status = $5",
        )
        .bind(id.get())
        .bind(status.as_str())
        .bind(error_message)
        .bind(status.is_terminal())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_failure(id, status).await);
        }

        tracing::trace!(event_id = %id, status = %status, "Updated event status");
        Ok(())
    }

    async fn get_by_id(&self, id: EventRecordId) -> Result<Option<EventRecord>, DbError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM rocket_events WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(EventRecord::try_from).transpose()
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, DbError> {
        let result = sqlx::query(
            r"UPDATE rocket_events
              SET status = 'pending', claimed_at = NULL
              WHERE status = 'processing'
                AND claimed_at <= now() - make_interval(secs => $1)",
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "Returned stale processing events to pending");
        }
        Ok(reclaimed)
    }
}

/// A row from the `rocket_events` table.
///
/// Statuses are read as text and validated when converting into
/// [`EventRecord`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Auto-incremented record id.
    pub id: i64,
    /// Rocket identifier.
    pub rocket_id: String,
    /// Producer-assigned sequence number.
    pub sequence_number: i64,
    /// Event type tag.
    pub event_type: String,
    /// Undecoded event body.
    pub payload: serde_json::Value,
    /// Lifecycle status as stored.
    pub status: String,
    /// Receipt time.
    pub received_at: DateTime<Utc>,
    /// Terminal status time.
    pub processed_at: Option<DateTime<Utc>>,
    /// Failure description.
    pub error_message: Option<String>,
    /// Last claim time.
    pub claimed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = DbError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: EventRecordId(row.id),
            rocket_id: RocketId(row.rocket_id),
            sequence_number: row.sequence_number,
            event_type: row.event_type,
            payload: row.payload,
            status: row.status.parse()?,
            received_at: row.received_at,
            processed_at: row.processed_at,
            error_message: row.error_message,
            claimed_at: row.claimed_at,
        })
    }
}
