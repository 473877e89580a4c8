//! Data layer for the rocket telemetry engine.
//!
//! `PostgreSQL` is the durable home of both tables the engine works with:
//! received events with their processing status, and current rocket state.
//! The engine depends only on the traits in [`store`]; the same guarantees
//! are provided by an in-memory backend for tests and database-less runs.
//!
//! # Architecture
//!
//! ```text
//! Ingestion
//!     |
//!     +-- create_or_replace_pending --> EventRecordStore (rocket_events)
//!
//! Dispatcher workers
//!     |
//!     +-- claim_pending_batch / update_status --> EventRecordStore
//!     +-- get / conditional_upsert -------------> RocketStore (rockets)
//! ```
//!
//! # Modules
//!
//! - [`store`] -- Store traits and upsert outcomes
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`event_store`] -- `PostgreSQL` event record store
//! - [`rocket_store`] -- `PostgreSQL` rocket state store
//! - [`memory`] -- In-memory implementation of both stores
//! - [`error`] -- Shared error types

pub mod error;
pub mod event_store;
pub mod memory;
pub mod postgres;
pub mod rocket_store;
pub mod store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use event_store::{EventRow, PgEventStore};
pub use memory::InMemoryStore;
pub use postgres::{PostgresConfig, PostgresPool};
pub use rocket_store::{PgRocketStore, RocketRow};
pub use store::{Disposition, EventRecordStore, RocketStore, UpsertOutcome};
