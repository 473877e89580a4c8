//! Event payload bodies, one struct per [`EventKind`](crate::EventKind).
//!
//! Field names follow the producer's JSON (camelCase). Payloads stay as raw
//! JSON on the event record and are only decoded into these structs when the
//! reducer applies them.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Body of `RocketLaunched`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct LaunchedPayload {
    /// Rocket model. Producers send this as `type`.
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    /// Speed at launch.
    pub launch_speed: i64,
    /// Initial mission.
    pub mission: String,
}

/// Body of `RocketSpeedIncreased` and `RocketSpeedDecreased`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SpeedChangePayload {
    /// Magnitude of the change.
    pub by: i64,
}

/// Body of `RocketExploded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ExplodedPayload {
    /// Why the rocket exploded.
    pub reason: String,
}

/// Body of `RocketMissionChanged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MissionChangedPayload {
    /// The mission replacing the current one.
    pub new_mission: String,
}
