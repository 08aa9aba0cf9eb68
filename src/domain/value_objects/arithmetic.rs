//! # Checked Arithmetic
//!
//! Traits and utilities for safe money arithmetic.
//!
//! This module provides:
//! - [`ArithmeticError`] - Error type for arithmetic failures
//! - [`CheckedArithmetic`] - Trait for safe arithmetic operations
//! - [`Rounding`] - Enum for explicit rounding direction
//! - [`round_cents`] / [`div_round_cents`] - Two-decimal rounding helpers
//!
//! Ledger amounts are always kept at two decimals. Reservations round
//! [`Rounding::Down`] while debits round [`Rounding::Up`], so a handler is
//! never under-charged by rounding.
//!
//! # Examples
//!
//! ```
//! use deal_router::domain::value_objects::arithmetic::{round_cents, Rounding};
//! use rust_decimal::Decimal;
//!
//! let raw = Decimal::new(70_005, 3); // 70.005
//! assert_eq!(round_cents(raw, Rounding::Down), Decimal::new(7000, 2));
//! assert_eq!(round_cents(raw, Rounding::Up), Decimal::new(7001, 2));
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of decimal places kept for every ledger amount.
pub const MONEY_SCALE: u32 = 2;

/// Error type for arithmetic operations.
///
/// Represents failures that can occur during checked arithmetic,
/// including overflow, underflow, division by zero, and invalid values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ArithmeticError {
    /// Arithmetic operation resulted in overflow.
    #[error("arithmetic overflow")]
    Overflow,

    /// Arithmetic operation resulted in underflow.
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero attempted.
    #[error("division by zero")]
    DivisionByZero,

    /// Invalid value provided (e.g., negative when positive required).
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
}

/// Result type for arithmetic operations.
pub type ArithmeticResult<T> = Result<T, ArithmeticError>;

/// Rounding direction for two-decimal money amounts.
///
/// # Examples
///
/// ```
/// use deal_router::domain::value_objects::arithmetic::{div_round_cents, Rounding};
/// use rust_decimal::Decimal;
///
/// // 10 / 3 = 3.333...
/// let down = div_round_cents(Decimal::new(10, 0), Decimal::new(3, 0), Rounding::Down).unwrap();
/// assert_eq!(down, Decimal::new(333, 2));
///
/// let up = div_round_cents(Decimal::new(10, 0), Decimal::new(3, 0), Rounding::Up).unwrap();
/// assert_eq!(up, Decimal::new(334, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rounding {
    /// Round towards negative infinity (floor).
    Down,
    /// Round towards positive infinity (ceiling).
    Up,
}

impl Rounding {
    #[inline]
    const fn strategy(self) -> RoundingStrategy {
        match self {
            Self::Down => RoundingStrategy::ToNegativeInfinity,
            Self::Up => RoundingStrategy::ToPositiveInfinity,
        }
    }
}

impl fmt::Display for Rounding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down => write!(f, "Down"),
            Self::Up => write!(f, "Up"),
        }
    }
}

/// Rounds a value to [`MONEY_SCALE`] decimals in the given direction.
///
/// The result always carries exactly two decimals so equal amounts compare
/// and serialize identically.
#[inline]
#[must_use]
pub fn round_cents(value: Decimal, rounding: Rounding) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, rounding.strategy());
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Divides and rounds the quotient to two decimals.
///
/// # Errors
///
/// Returns `ArithmeticError::DivisionByZero` if the denominator is zero.
/// Returns `ArithmeticError::Overflow` if the quotient does not fit.
#[inline]
pub fn div_round_cents(
    numerator: Decimal,
    denominator: Decimal,
    rounding: Rounding,
) -> ArithmeticResult<Decimal> {
    let quotient = numerator.safe_div(denominator)?;
    Ok(round_cents(quotient, rounding))
}

/// Trait for checked arithmetic operations.
///
/// Provides safe arithmetic methods that return `Result` instead of
/// panicking on overflow, underflow, or division by zero.
pub trait CheckedArithmetic: Sized {
    /// Safely add two values.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticError::Overflow` if the result would overflow.
    fn safe_add(self, rhs: Self) -> ArithmeticResult<Self>;

    /// Safely subtract two values.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticError::Underflow` if the result would underflow.
    fn safe_sub(self, rhs: Self) -> ArithmeticResult<Self>;

    /// Safely multiply two values.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticError::Overflow` if the result would overflow.
    fn safe_mul(self, rhs: Self) -> ArithmeticResult<Self>;

    /// Safely divide two values.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticError::DivisionByZero` if the divisor is zero.
    fn safe_div(self, rhs: Self) -> ArithmeticResult<Self>;
}

impl CheckedArithmetic for Decimal {
    #[inline]
    fn safe_add(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_add(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn safe_sub(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_sub(rhs).ok_or(ArithmeticError::Underflow)
    }

    #[inline]
    fn safe_mul(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_mul(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn safe_div(self, rhs: Self) -> ArithmeticResult<Self> {
        if rhs.is_zero() {
            return Err(ArithmeticError::DivisionByZero);
        }
        self.checked_div(rhs).ok_or(ArithmeticError::Overflow)
    }
}

impl CheckedArithmetic for u64 {
    #[inline]
    fn safe_add(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_add(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn safe_sub(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_sub(rhs).ok_or(ArithmeticError::Underflow)
    }

    #[inline]
    fn safe_mul(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_mul(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn safe_div(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_div(rhs).ok_or(ArithmeticError::DivisionByZero)
    }
}
