//! The producer's message envelope.
//!
//! Rockets publish JSON of the form:
//!
//! ```json
//! {
//!   "metadata": {
//!     "channel": "193270a9-c9cf-404a-8f83-838e71d9ae67",
//!     "messageNumber": 1,
//!     "messageTime": "2022-02-02T19:39:05.86337+01:00",
//!     "messageType": "RocketLaunched"
//!   },
//!   "message": { "type": "Falcon-9", "launchSpeed": 500, "mission": "ARTEMIS" }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::RocketId;

/// Routing and ordering metadata of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MessageMetadata {
    /// Rocket identifier.
    pub channel: RocketId,
    /// Per-channel sequence number.
    pub message_number: i64,
    /// Producer-side send time.
    pub message_time: DateTime<Utc>,
    /// Event type tag.
    pub message_type: String,
}

/// A complete inbound message: metadata plus an opaque body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IncomingMessage {
    /// Routing and ordering metadata.
    pub metadata: MessageMetadata,
    /// Event body, decoded later by the reducer.
    pub message: serde_json::Value,
}
