//! Caller-facing operations: ingestion and queries.
//!
//! Ingestion is the only synchronous write path. It stores the event as a
//! pending record and returns its id; applying it to rocket state happens
//! later on a dispatcher worker.

use std::sync::Arc;

use chrono::Utc;
use rockets_db::{DbError, Disposition, EventRecordStore, RocketStore};
use rockets_types::{
    EventRecord, EventRecordId, IncomingMessage, PendingEvent, Rocket, RocketId, SortKey,
};
use serde::Serialize;
use tracing::{debug, info};

/// Errors returned to callers of [`RocketService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The event payload could not be encoded as JSON.
    #[error("failed to serialize payload: {source}")]
    Serialization {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: DbError,
    },

    /// No rocket has the requested id.
    #[error("rocket {0} not found")]
    RocketNotFound(RocketId),

    /// No event record has the requested id.
    #[error("event {0} not found")]
    EventNotFound(EventRecordId),
}

/// Ingestion and query facade over the stores.
#[derive(Clone)]
pub struct RocketService {
    events: Arc<dyn EventRecordStore>,
    rockets: Arc<dyn RocketStore>,
}

impl RocketService {
    /// Create a service over the given stores.
    pub const fn new(events: Arc<dyn EventRecordStore>, rockets: Arc<dyn RocketStore>) -> Self {
        Self { events, rockets }
    }

    /// Store an event as pending and return its record id.
    ///
    /// Re-sending the same `(rocket_id, sequence_number)` returns the same
    /// id. While the record is still pending its type and payload are
    /// replaced; once a worker has picked it up it is left as is.
    pub async fn ingest<P: Serialize + ?Sized>(
        &self,
        rocket_id: RocketId,
        sequence_number: i64,
        event_type: &str,
        payload: &P,
    ) -> Result<EventRecordId, ServiceError> {
        let payload = serde_json::to_value(payload)?;
        let outcome = self
            .events
            .create_or_replace_pending(&PendingEvent {
                rocket_id,
                sequence_number,
                event_type: event_type.to_owned(),
                payload,
                received_at: Utc::now(),
            })
            .await?;

        match outcome.disposition {
            Disposition::Inserted => debug!(event_id = %outcome.id, event_type, "Event ingested"),
            Disposition::Replaced => {
                info!(event_id = %outcome.id, event_type, "Pending event replaced by redelivery");
            }
            Disposition::Unchanged(status) => {
                info!(event_id = %outcome.id, %status, "Redelivered event already picked up");
            }
        }
        Ok(outcome.id)
    }

    /// Ingest a message in the producer's envelope format.
    pub async fn ingest_message(
        &self,
        message: IncomingMessage,
    ) -> Result<EventRecordId, ServiceError> {
        let IncomingMessage { metadata, message } = message;
        self.ingest(
            metadata.channel,
            metadata.message_number,
            &metadata.message_type,
            &message,
        )
        .await
    }

    /// Current state of one rocket.
    pub async fn get_rocket(&self, id: &RocketId) -> Result<Rocket, ServiceError> {
        self.rockets
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::RocketNotFound(id.clone()))
    }

    /// All rockets, ascending by `sort`, or most recently updated first.
    pub async fn list_rockets(&self, sort: Option<SortKey>) -> Result<Vec<Rocket>, ServiceError> {
        Ok(self.rockets.list_all(sort).await?)
    }

    /// Status and details of one event record.
    pub async fn get_event(&self, id: EventRecordId) -> Result<EventRecord, ServiceError> {
        self.events
            .get_by_id(id)
            .await?
            .ok_or(ServiceError::EventNotFound(id))
    }
}
