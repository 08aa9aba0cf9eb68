//! # Value Objects
//!
//! Immutable types with validation and domain semantics.
//!
//! ## Identity Types
//!
//! - [`OperationId`]: UUID-based operation identifier
//! - [`HandlerId`], [`MerchantId`], [`CounterpartyId`]: String-based identifiers
//!
//! ## Arithmetic
//!
//! - [`ArithmeticError`]: Error type for arithmetic failures
//! - [`CheckedArithmetic`]: Trait for safe arithmetic operations
//! - [`Rounding`]: Floor or ceiling to two decimals
//!
//! ## Domain Enums
//!
//! - [`Direction`]: Deal or payout
//! - [`OperationStatus`]: Operation lifecycle states
//! - [`TrafficTier`]: Counterparty segmentation
//! - [`BalanceCurrency`]: Operation or settlement balance pair
//! - [`AttemptOutcome`]: Partner attempt result

pub mod arithmetic;
pub mod enums;
pub mod ids;
pub mod operation_status;
pub mod timestamp;

pub use arithmetic::{
    ArithmeticError, ArithmeticResult, CheckedArithmetic, MONEY_SCALE, Rounding, div_round_cents,
    round_cents,
};
pub use enums::{AttemptOutcome, BalanceCurrency, Direction, ParseEnumError, TrafficTier};
pub use ids::{CounterpartyId, HandlerId, MerchantId, OperationId};
pub use operation_status::OperationStatus;
pub use timestamp::Timestamp;
