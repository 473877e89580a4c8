//! Core record structs: stored event records and current rocket state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{EventStatus, RocketStatus};
use crate::ids::{EventRecordId, RocketId};

// ---------------------------------------------------------------------------
// Event records
// ---------------------------------------------------------------------------

/// A received event as stored in the `rocket_events` table.
///
/// `(rocket_id, sequence_number)` is unique across all records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventRecord {
    /// Store-assigned identifier.
    pub id: EventRecordId,
    /// The rocket this event belongs to.
    pub rocket_id: RocketId,
    /// Producer-assigned, per-rocket apply order.
    pub sequence_number: i64,
    /// Wire tag selecting the reducer handler.
    pub event_type: String,
    /// Undecoded event body.
    pub payload: serde_json::Value,
    /// Lifecycle status.
    pub status: EventStatus,
    /// When the record was (last) received.
    pub received_at: DateTime<Utc>,
    /// When the record reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Failure description, only set when `status` is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When a worker last claimed the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

/// An event ready to be written as a pending record.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    /// The rocket this event belongs to.
    pub rocket_id: RocketId,
    /// Producer-assigned, per-rocket apply order.
    pub sequence_number: i64,
    /// Wire tag selecting the reducer handler.
    pub event_type: String,
    /// Serialized event body.
    pub payload: serde_json::Value,
    /// Receipt time recorded on the row.
    pub received_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Rocket state
// ---------------------------------------------------------------------------

/// Current state of a single rocket, folded from its applied events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Rocket {
    /// Rocket identifier (the producer's channel).
    pub id: RocketId,
    /// Rocket model, e.g. `Falcon-9`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Current speed; never negative.
    pub current_speed: i64,
    /// Current mission name.
    pub mission: String,
    /// Flight status.
    pub status: RocketStatus,
    /// Why the rocket exploded, only set when `status` is `exploded`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explosion_reason: Option<String>,
    /// When the rocket launched (or was first observed).
    pub launch_time: DateTime<Utc>,
    /// Last state change.
    pub last_updated: DateTime<Utc>,
    /// Highest sequence number folded into this state.
    pub last_applied_sequence: i64,
}

impl Rocket {
    /// A freshly observed rocket with nothing applied yet.
    pub fn new(id: RocketId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: String::new(),
            current_speed: 0,
            mission: String::new(),
            status: RocketStatus::Active,
            explosion_reason: None,
            launch_time: now,
            last_updated: now,
            last_applied_sequence: 0,
        }
    }

    /// Whether an event with `sequence_number` has already been folded in.
    pub const fn has_applied(&self, sequence_number: i64) -> bool {
        sequence_number <= self.last_applied_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rocket_is_active_and_unapplied() {
        let now = Utc::now();
        let rocket = Rocket::new(RocketId::from("r-1"), now);
        assert_eq!(rocket.status, RocketStatus::Active);
        assert_eq!(rocket.current_speed, 0);
        assert_eq!(rocket.last_applied_sequence, 0);
        assert_eq!(rocket.launch_time, now);
        assert!(!rocket.has_applied(1));
    }

    #[test]
    fn rocket_serializes_producer_field_names() {
        let mut rocket = Rocket::new(RocketId::from("r-1"), Utc::now());
        rocket.kind = String::from("Falcon-9");
        let json = serde_json::to_value(&rocket).unwrap_or_default();
        assert_eq!(json["type"], "Falcon-9");
        assert_eq!(json["currentSpeed"], 0);
        assert_eq!(json["status"], "active");
        assert!(json.get("explosionReason").is_none());
    }
}
