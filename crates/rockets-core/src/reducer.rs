//! Pure state transitions for rocket events.
//!
//! Raw event records carry a type tag and an opaque JSON payload. They are
//! decoded into the closed [`RocketEvent`] union at this boundary and folded
//! into the previous [`Rocket`] state by [`reduce`]. Nothing here touches a
//! store or a clock; `now` is passed in.
//!
//! The reducer does not look at sequence numbers. The ordering guard and the
//! `last_applied_sequence` bookkeeping belong to the processor.

use chrono::{DateTime, Utc};
use rockets_types::{
    EventKind, ExplodedPayload, LaunchedPayload, MissionChangedPayload, Rocket, RocketId,
    RocketStatus, SpeedChangePayload,
};
use serde::Deserialize;

/// Terminal failures: the event can never be applied, so it is not retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReduceError {
    /// The payload does not match the shape its event type requires.
    #[error("malformed {event_type} payload: {reason}")]
    MalformedPayload {
        /// The event type tag.
        event_type: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The event type tag is not one the reducer handles.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}

/// A decoded event body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RocketEvent {
    /// The rocket launched.
    Launched(LaunchedPayload),
    /// Speed went up.
    SpeedIncreased(SpeedChangePayload),
    /// Speed went down.
    SpeedDecreased(SpeedChangePayload),
    /// The rocket exploded.
    Exploded(ExplodedPayload),
    /// The rocket got a new mission.
    MissionChanged(MissionChangedPayload),
    /// A tag outside the known set. Decoding succeeds; reducing fails.
    Unrecognized {
        /// The tag as received.
        event_type: String,
    },
}

impl RocketEvent {
    /// Decode a stored `(event_type, payload)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::MalformedPayload`] if the payload does not
    /// deserialize into the body for `event_type`, or carries a negative
    /// speed.
    pub fn decode(event_type: &str, payload: &serde_json::Value) -> Result<Self, ReduceError> {
        let Some(kind) = EventKind::from_tag(event_type) else {
            return Ok(Self::Unrecognized {
                event_type: event_type.to_owned(),
            });
        };

        let event = match kind {
            EventKind::RocketLaunched => {
                let body: LaunchedPayload = decode_body(event_type, payload)?;
                non_negative(event_type, "launchSpeed", body.launch_speed)?;
                Self::Launched(body)
            }
            EventKind::RocketSpeedIncreased => {
                let body: SpeedChangePayload = decode_body(event_type, payload)?;
                non_negative(event_type, "by", body.by)?;
                Self::SpeedIncreased(body)
            }
            EventKind::RocketSpeedDecreased => {
                let body: SpeedChangePayload = decode_body(event_type, payload)?;
                non_negative(event_type, "by", body.by)?;
                Self::SpeedDecreased(body)
            }
            EventKind::RocketExploded => Self::Exploded(decode_body(event_type, payload)?),
            EventKind::RocketMissionChanged => {
                Self::MissionChanged(decode_body(event_type, payload)?)
            }
        };
        Ok(event)
    }
}

fn decode_body<'de, T: Deserialize<'de>>(
    event_type: &str,
    payload: &'de serde_json::Value,
) -> Result<T, ReduceError> {
    T::deserialize(payload).map_err(|e| ReduceError::MalformedPayload {
        event_type: event_type.to_owned(),
        reason: e.to_string(),
    })
}

fn non_negative(event_type: &str, field: &str, value: i64) -> Result<(), ReduceError> {
    if value < 0 {
        return Err(ReduceError::MalformedPayload {
            event_type: event_type.to_owned(),
            reason: format!("{field} must not be negative, got {value}"),
        });
    }
    Ok(())
}

/// Fold one event into the state of `rocket_id`.
///
/// With no prior state the rocket starts fresh (see [`Rocket::new`]). The
/// returned state keeps the prior `last_applied_sequence` and
/// `last_updated`; the caller stamps both.
///
/// # Errors
///
/// Returns [`ReduceError::UnknownEventType`] for
/// [`RocketEvent::Unrecognized`].
pub fn reduce(
    current: Option<&Rocket>,
    rocket_id: &RocketId,
    event: &RocketEvent,
    now: DateTime<Utc>,
) -> Result<Rocket, ReduceError> {
    let mut next = current
        .cloned()
        .unwrap_or_else(|| Rocket::new(rocket_id.clone(), now));

    match event {
        RocketEvent::Launched(body) => {
            next.kind.clone_from(&body.kind);
            next.current_speed = body.launch_speed.max(0);
            next.mission.clone_from(&body.mission);
            next.launch_time = now;
            next.status = RocketStatus::Active;
            next.explosion_reason = None;
        }
        RocketEvent::SpeedIncreased(body) => {
            next.current_speed = next.current_speed.saturating_add(body.by).max(0);
        }
        RocketEvent::SpeedDecreased(body) => {
            next.current_speed = next.current_speed.saturating_sub(body.by).max(0);
        }
        RocketEvent::Exploded(body) => {
            next.status = RocketStatus::Exploded;
            next.explosion_reason = Some(body.reason.clone());
            next.current_speed = 0;
        }
        RocketEvent::MissionChanged(body) => {
            next.mission.clone_from(&body.new_mission);
        }
        RocketEvent::Unrecognized { event_type } => {
            return Err(ReduceError::UnknownEventType(event_type.clone()));
        }
    }

    Ok(next)
}
