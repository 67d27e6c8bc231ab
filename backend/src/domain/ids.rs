//! UUID-backed identifiers for the persisted row classes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parse failure for any identifier newtype.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} must be a valid UUID")]
pub struct IdentifierParseError {
    kind: &'static str,
}

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID, typically read back from storage.
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Access the underlying UUID.
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierParseError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                if value.trim() != value {
                    return Err(IdentifierParseError { kind: $kind });
                }
                Uuid::parse_str(value)
                    .map(Self)
                    .map_err(|_| IdentifierParseError { kind: $kind })
            }
        }
    };
}

uuid_identifier!(
    /// Stable account identifier.
    AccountId,
    "account id"
);
uuid_identifier!(
    /// Stable ride identifier.
    RideId,
    "ride id"
);
uuid_identifier!(
    /// Identifier of a secondary passenger row.
    PassengerId,
    "passenger id"
);
uuid_identifier!(
    /// Stable rating identifier.
    RatingId,
    "rating id"
);
uuid_identifier!(
    /// Identifier of a queued notification intent.
    IntentId,
    "notification intent id"
);
