//! Error types for the data layer.
//!
//! All store operations return [`DbError`], which wraps the underlying
//! [`sqlx`] errors and adds the lifecycle violations the stores enforce
//! themselves.

use rockets_types::{EventRecordId, EventStatus, UnknownVariant};

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be mapped back to a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(#[from] UnknownVariant),

    /// No event record has the given id.
    #[error("event record {0} not found")]
    EventNotFound(EventRecordId),

    /// A status update that the lifecycle does not permit.
    #[error("event record {id}: illegal status transition {from} -> {to}")]
    InvalidTransition {
        /// The record being updated.
        id: EventRecordId,
        /// Its current status.
        from: EventStatus,
        /// The requested status.
        to: EventStatus,
    },

    /// The store is temporarily unable to serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
