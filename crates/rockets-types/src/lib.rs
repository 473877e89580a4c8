//! Shared type definitions for the rocket telemetry engine.
//!
//! Every crate in the workspace speaks these types. Records that leave the
//! engine (rocket state, event status) also export `TypeScript` bindings via
//! `ts-rs` for API clients.
//!
//! # Modules
//!
//! - [`ids`] -- Newtype identifiers for rockets and event records
//! - [`enums`] -- Statuses, event kinds, and listing sort keys
//! - [`structs`] -- Stored event records and rocket state
//! - [`payloads`] -- Typed bodies for each event kind
//! - [`message`] -- The producer's inbound message envelope

pub mod enums;
pub mod ids;
pub mod message;
pub mod payloads;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{EventKind, EventStatus, RocketStatus, SortKey, UnknownVariant};
pub use ids::{EventRecordId, RocketId};
pub use message::{IncomingMessage, MessageMetadata};
pub use payloads::{ExplodedPayload, LaunchedPayload, MissionChangedPayload, SpeedChangePayload};
pub use structs::{EventRecord, PendingEvent, Rocket};
