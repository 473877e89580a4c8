//! Enumeration types for rocket telemetry processing.
//!
//! Status enums are stored as lowercase text in `PostgreSQL`; the
//! [`as_str`](EventStatus::as_str) / [`FromStr`] pairs here are the single
//! mapping between the two representations.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Error returned when a stored string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    /// Which enumeration was being parsed.
    pub kind: &'static str,
    /// The offending value.
    pub value: String,
}

// ---------------------------------------------------------------------------
// Event record status
// ---------------------------------------------------------------------------

/// Processing status of a stored event record.
///
/// ```text
/// pending --> processing --> processed
///                       \--> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EventStatus {
    /// Received and waiting for a worker.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Applied, skipped as stale, or superseded by a newer write.
    Processed,
    /// Terminally rejected (malformed payload or unknown type).
    Failed,
}

impl EventStatus {
    /// The `PostgreSQL` text representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    /// Whether the status ends the record's lifecycle.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    /// The only status a record may hold before moving to `self`.
    ///
    /// `pending` has no predecessor: returning a claimed record to `pending`
    /// is not a status update, it only happens through the reclaim sweep.
    pub const fn predecessor(self) -> Option<Self> {
        match self {
            Self::Pending => None,
            Self::Processing => Some(Self::Pending),
            Self::Processed | Self::Failed => Some(Self::Processing),
        }
    }

    /// Whether `self -> next` is a permitted status update.
    pub fn can_transition_to(self, next: Self) -> bool {
        next.predecessor() == Some(self)
    }
}

impl core::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant {
                kind: "event status",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Rocket status
// ---------------------------------------------------------------------------

/// Flight status of a rocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RocketStatus {
    /// In flight.
    Active,
    /// Destroyed; speed is pinned to zero.
    Exploded,
}

impl RocketStatus {
    /// The `PostgreSQL` text representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Exploded => "exploded",
        }
    }
}

impl core::fmt::Display for RocketStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RocketStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "exploded" => Ok(Self::Exploded),
            other => Err(UnknownVariant {
                kind: "rocket status",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The closed set of event types the reducer understands.
///
/// Producers send the `Rocket`-prefixed tags; the short names are accepted
/// as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// A rocket left the pad.
    RocketLaunched,
    /// Speed went up by a delta.
    RocketSpeedIncreased,
    /// Speed went down by a delta.
    RocketSpeedDecreased,
    /// The rocket exploded.
    RocketExploded,
    /// The rocket was assigned a new mission.
    RocketMissionChanged,
}

impl EventKind {
    /// All known kinds.
    pub const ALL: [Self; 5] = [
        Self::RocketLaunched,
        Self::RocketSpeedIncreased,
        Self::RocketSpeedDecreased,
        Self::RocketExploded,
        Self::RocketMissionChanged,
    ];

    /// The canonical wire tag.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::RocketLaunched => "RocketLaunched",
            Self::RocketSpeedIncreased => "RocketSpeedIncreased",
            Self::RocketSpeedDecreased => "RocketSpeedDecreased",
            Self::RocketExploded => "RocketExploded",
            Self::RocketMissionChanged => "RocketMissionChanged",
        }
    }

    /// Resolve a wire tag, accepting both canonical and short names.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let short = tag.strip_prefix("Rocket").unwrap_or(tag);
        match short {
            "Launched" => Some(Self::RocketLaunched),
            "SpeedIncreased" => Some(Self::RocketSpeedIncreased),
            "SpeedDecreased" => Some(Self::RocketSpeedDecreased),
            "Exploded" => Some(Self::RocketExploded),
            "MissionChanged" => Some(Self::RocketMissionChanged),
            _ => None,
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// Listing order
// ---------------------------------------------------------------------------

/// Field a rocket listing can be sorted by (ascending).
///
/// When no key is given, listings are ordered by `last_updated` descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum SortKey {
    /// Rocket kind (the producer calls it `type`).
    Kind,
    /// Current speed.
    Speed,
    /// Mission name.
    Mission,
    /// Flight status.
    Status,
    /// Launch time.
    LaunchTime,
    /// Last state change.
    LastUpdated,
}

impl SortKey {
    /// Resolve a query-string sort name.
    ///
    /// Unknown names yield `None`, which callers treat as the default order.
    pub fn from_query(name: &str) -> Option<Self> {
        match name {
            "type" | "kind" => Some(Self::Kind),
            "speed" => Some(Self::Speed),
            "mission" => Some(Self::Mission),
            "status" => Some(Self::Status),
            "launchTime" => Some(Self::LaunchTime),
            "lastUpdated" => Some(Self::LastUpdated),
            _ => None,
        }
    }
}
