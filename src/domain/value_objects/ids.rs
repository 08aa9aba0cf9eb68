//! # Identifier Types
//!
//! Strongly typed identifiers for the routing domain.
//!
//! - [`OperationId`]: UUID-based identifier for deals and payouts
//! - [`HandlerId`], [`MerchantId`], [`CounterpartyId`]: string-based identifiers
//!
//! # Examples
//!
//! ```
//! use deal_router::domain::value_objects::ids::{HandlerId, OperationId};
//!
//! let op = OperationId::new_v4();
//! let handler = HandlerId::new("trader-7");
//! assert_eq!(handler.as_str(), "trader-7");
//! assert_ne!(op, OperationId::new_v4());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of an operation (deal or payout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Wraps an existing UUID.
    #[inline]
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a random identifier.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[inline]
    #[must_use]
    pub const fn get(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OperationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a handler (internal trader or aggregator partner).
    HandlerId
);

string_id!(
    /// Identifier of a merchant submitting operations.
    MerchantId
);

string_id!(
    /// Identifier of the merchant's end customer (card holder, payer, payee).
    CounterpartyId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_order_lexicographically() {
        let mut ids = vec![HandlerId::new("b"), HandlerId::new("a"), HandlerId::new("c")];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(HandlerId::as_str).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn operation_id_displays_uuid() {
        let uuid = Uuid::nil();
        assert_eq!(
            OperationId::new(uuid).to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
    }
}
