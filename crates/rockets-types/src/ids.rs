//! Type-safe identifier wrappers.
//!
//! Rockets are identified by the producer's channel string, event records by
//! the store-assigned `BIGSERIAL` key. Wrapping both prevents passing a raw
//! sequence number where a record id is expected.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around an inner identifier value.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub $inner);

        impl $name {
            /// Return the inner value.
            pub fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(id: $inner) -> Self {
                Self(id)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of a rocket (the producer's channel).
    RocketId(String)
}

define_id! {
    /// Store-assigned identifier of an event record.
    EventRecordId(i64)
}

impl RocketId {
    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RocketId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl Copy for EventRecordId {}

impl EventRecordId {
    /// Return the raw database key.
    pub const fn get(self) -> i64 {
        self.0
    }
}
