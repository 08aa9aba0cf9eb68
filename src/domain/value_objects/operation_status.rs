//! # Operation Status
//!
//! Lifecycle state machine shared by deals and payouts.
//!
//! # State Machine
//!
//! ```text
//! Created ─→ Active ─→ Checking ─→ Completed
//!    │          │          │
//!    │          ├──────────┴─→ Dispute ─→ Completed | Canceled
//!    ├──────────┴──────────┴─→ Canceled ─→ Created (re-queue)
//!    └─→ Expired
//! ```
//!
//! "Assigned" is not a separate status: it is `Created` with a handler set.
//!
//! # Examples
//!
//! ```
//! use deal_router::domain::value_objects::operation_status::OperationStatus;
//!
//! let status = OperationStatus::Created;
//! assert!(status.can_transition_to(OperationStatus::Active));
//! assert!(!OperationStatus::Expired.can_transition_to(OperationStatus::Created));
//! ```

use crate::domain::value_objects::enums::ParseEnumError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum OperationStatus {
    /// Waiting in the pool, or assigned but not yet accepted.
    #[default]
    Created = 0,
    /// Accepted by the handler, payment in progress.
    Active = 1,
    /// Payment claimed, under verification.
    Checking = 2,
    /// Funds confirmed and settled (terminal). Also known as "ready".
    Completed = 3,
    /// Canceled; may be re-queued.
    Canceled = 4,
    /// Expiry passed before completion (terminal).
    Expired = 5,
    /// Under manual dispute resolution.
    Dispute = 6,
}

impl OperationStatus {
    /// Returns true if this is a terminal state.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }

    /// Returns true if a handler is working on the operation.
    ///
    /// These are the statuses counted against a handler's concurrency limit
    /// (together with `Created` when a handler is assigned).
    #[inline]
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::Active | Self::Checking | Self::Dispute)
    }

    /// Returns true if this state can transition to the target state.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Active)
                | (Self::Created, Self::Canceled)
                | (Self::Created, Self::Expired)
                | (Self::Active, Self::Checking)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Canceled)
                | (Self::Active, Self::Dispute)
                | (Self::Checking, Self::Completed)
                | (Self::Checking, Self::Canceled)
                | (Self::Checking, Self::Dispute)
                | (Self::Dispute, Self::Completed)
                | (Self::Dispute, Self::Canceled)
                | (Self::Canceled, Self::Created)
        )
    }

    /// Returns the numeric value of this state.
    #[inline]
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Active => "ACTIVE",
            Self::Checking => "CHECKING",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
            Self::Expired => "EXPIRED",
            Self::Dispute => "DISPUTE",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OperationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATED" => Ok(Self::Created),
            "ACTIVE" => Ok(Self::Active),
            "CHECKING" => Ok(Self::Checking),
            "COMPLETED" | "READY" => Ok(Self::Completed),
            "CANCELED" | "CANCELLED" => Ok(Self::Canceled),
            "EXPIRED" => Ok(Self::Expired),
            "DISPUTE" => Ok(Self::Dispute),
            _ => Err(ParseEnumError::InvalidValue("OperationStatus", s.to_string())),
        }
    }
}

/// Error returned when converting an invalid u8 to [`OperationStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOperationStatusError(
    /// The invalid u8 value.
    pub u8,
);

impl fmt::Display for InvalidOperationStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid operation status: {}", self.0)
    }
}

impl std::error::Error for InvalidOperationStatusError {}

impl TryFrom<u8> for OperationStatus {
    type Error = InvalidOperationStatusError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Created),
            1 => Ok(Self::Active),
            2 => Ok(Self::Checking),
            3 => Ok(Self::Completed),
            4 => Ok(Self::Canceled),
            5 => Ok(Self::Expired),
            6 => Ok(Self::Dispute),
            other => Err(InvalidOperationStatusError(other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL: [OperationStatus; 7] = [
        OperationStatus::Created,
        OperationStatus::Active,
        OperationStatus::Checking,
        OperationStatus::Completed,
        OperationStatus::Canceled,
        OperationStatus::Expired,
        OperationStatus::Dispute,
    ];

    mod transitions {
        use super::*;

        #[test]
        fn terminal_states_have_no_exits() {
            for from in ALL.iter().filter(|s| s.is_terminal()) {
                for to in ALL {
                    assert!(!from.can_transition_to(to), "{from} -> {to}");
                }
            }
        }

        #[test]
        fn only_canceled_returns_to_created() {
            for from in ALL {
                let allowed = from.can_transition_to(OperationStatus::Created);
                assert_eq!(allowed, from == OperationStatus::Canceled, "{from}");
            }
        }

        #[test]
        fn happy_path_is_allowed() {
            assert!(OperationStatus::Created.can_transition_to(OperationStatus::Active));
            assert!(OperationStatus::Active.can_transition_to(OperationStatus::Checking));
            assert!(OperationStatus::Checking.can_transition_to(OperationStatus::Completed));
        }
    }

    mod conversions {
        use super::*;

        #[test]
        fn u8_roundtrip() {
            for status in ALL {
                assert_eq!(OperationStatus::try_from(status.as_u8()).unwrap(), status);
            }
            assert_eq!(
                OperationStatus::try_from(42),
                Err(InvalidOperationStatusError(42))
            );
        }

        #[test]
        fn parses_aliases() {
            assert_eq!(
                "ready".parse::<OperationStatus>().unwrap(),
                OperationStatus::Completed
            );
            assert_eq!(
                "CANCELLED".parse::<OperationStatus>().unwrap(),
                OperationStatus::Canceled
            );
            assert!("ASSIGNED".parse::<OperationStatus>().is_err());
        }
    }
}
