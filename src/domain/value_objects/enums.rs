//! # Domain Enums
//!
//! Enumeration types for routing concepts:
//!
//! - [`Direction`] - Deal (money in) or payout (money out)
//! - [`TrafficTier`] - Counterparty segmentation by completed history
//! - [`BalanceCurrency`] - Which balance pair a reservation draws on
//! - [`AttemptOutcome`] - Result of a partner deal-creation attempt
//!
//! All enums implement `Display`, `FromStr`, and Serde traits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of money movement.
///
/// # Examples
///
/// ```
/// use deal_router::domain::value_objects::enums::Direction;
///
/// assert_eq!(Direction::In.to_string(), "IN");
/// assert!(Direction::Out.is_payout());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Direction {
    /// Incoming payment (deal).
    In = 0,
    /// Outgoing payment (payout).
    Out = 1,
}

impl Direction {
    /// Returns true for deals.
    #[inline]
    #[must_use]
    pub const fn is_deal(self) -> bool {
        matches!(self, Self::In)
    }

    /// Returns true for payouts.
    #[inline]
    #[must_use]
    pub const fn is_payout(self) -> bool {
        matches!(self, Self::Out)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Out => write!(f, "OUT"),
        }
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IN" | "DEAL" => Ok(Self::In),
            "OUT" | "PAYOUT" => Ok(Self::Out),
            _ => Err(ParseEnumError::InvalidValue("Direction", s.to_string())),
        }
    }
}

/// Traffic tier of a (merchant, counterparty) pair.
///
/// Boundaries: 0 completed operations is `New`, 1 to 9 is `Returning`,
/// 10 or more is `HighVolume`.
///
/// # Examples
///
/// ```
/// use deal_router::domain::value_objects::enums::TrafficTier;
///
/// assert_eq!(TrafficTier::from_completed_count(0), TrafficTier::New);
/// assert_eq!(TrafficTier::from_completed_count(9), TrafficTier::Returning);
/// assert_eq!(TrafficTier::from_completed_count(10), TrafficTier::HighVolume);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TrafficTier {
    /// No completed history.
    New = 0,
    /// Some completed history.
    Returning = 1,
    /// Established counterparty.
    HighVolume = 2,
}

impl TrafficTier {
    /// Completed count at which a counterparty stops being new.
    pub const RETURNING_THRESHOLD: u64 = 1;
    /// Completed count at which a counterparty becomes high volume.
    pub const HIGH_VOLUME_THRESHOLD: u64 = 10;

    /// Classifies a completed-operation count.
    #[must_use]
    pub const fn from_completed_count(count: u64) -> Self {
        if count >= Self::HIGH_VOLUME_THRESHOLD {
            Self::HighVolume
        } else if count >= Self::RETURNING_THRESHOLD {
            Self::Returning
        } else {
            Self::New
        }
    }

    /// All tiers in ascending order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::New, Self::Returning, Self::HighVolume]
    }
}

impl fmt::Display for TrafficTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Returning => write!(f, "RETURNING"),
            Self::HighVolume => write!(f, "HIGH_VOLUME"),
        }
    }
}

impl FromStr for TrafficTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "RETURNING" => Ok(Self::Returning),
            "HIGH_VOLUME" => Ok(Self::HighVolume),
            _ => Err(ParseEnumError::InvalidValue("TrafficTier", s.to_string())),
        }
    }
}

/// Balance pair a reservation is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum BalanceCurrency {
    /// Local currency the operation is denominated in.
    Operation = 0,
    /// Settlement currency handlers are credited in.
    Settlement = 1,
}

impl BalanceCurrency {
    /// Pair reserved for an operation in the given direction.
    ///
    /// Deals reserve settlement funds, payouts reserve local funds.
    #[must_use]
    pub const fn reserved_for(direction: Direction) -> Self {
        match direction {
            Direction::In => Self::Settlement,
            Direction::Out => Self::Operation,
        }
    }
}

impl fmt::Display for BalanceCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation => write!(f, "OPERATION"),
            Self::Settlement => write!(f, "SETTLEMENT"),
        }
    }
}

impl FromStr for BalanceCurrency {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPERATION" => Ok(Self::Operation),
            "SETTLEMENT" => Ok(Self::Settlement),
            _ => Err(ParseEnumError::InvalidValue("BalanceCurrency", s.to_string())),
        }
    }
}

/// Outcome of a remote deal-creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum AttemptOutcome {
    /// Partner accepted the deal.
    Accepted = 0,
    /// Partner answered but declined.
    Rejected = 1,
    /// No answer within the partner timeout.
    Timeout = 2,
    /// Transport or protocol failure.
    Error = 3,
}

impl AttemptOutcome {
    /// Returns true if the attempt produced a remote deal.
    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for AttemptOutcome {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            "TIMEOUT" => Ok(Self::Timeout),
            "ERROR" => Ok(Self::Error),
            _ => Err(ParseEnumError::InvalidValue("AttemptOutcome", s.to_string())),
        }
    }
}

/// Error type for parsing enum values from strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEnumError {
    /// Invalid value for the specified enum type.
    InvalidValue(&'static str, String),
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue(enum_name, value) => {
                write!(f, "invalid {} value: '{}'", enum_name, value)
            }
        }
    }
}

impl std::error::Error for ParseEnumError {}
