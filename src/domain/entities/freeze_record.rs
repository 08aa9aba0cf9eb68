//! # Freeze Record
//!
//! Ledger entry created when an operation is assigned.
//!
//! [`FreezeTerms`] computes what an assignment reserves; [`FreezeRecord`]
//! keeps those numbers so the later release or settle uses the exact amounts
//! captured at freeze time and never recomputes them.
//!
//! # Rounding
//!
//! - `frozen_amount`: requirement rounded down to two decimals
//! - `debited_amount`: requirement rounded up to two decimals, taken from
//!   `available` and added to `frozen`
//! - `settlement_amount`: `amount / rate` rounded down
//!
//! # Examples
//!
//! ```
//! use deal_router::domain::entities::freeze_record::FreezeTerms;
//! use deal_router::domain::value_objects::{BalanceCurrency, Direction};
//! use rust_decimal::Decimal;
//!
//! let terms = FreezeTerms::compute(
//!     Direction::In,
//!     Decimal::new(7000, 0),
//!     Decimal::new(100, 0),
//!     Decimal::ZERO,
//! ).unwrap();
//!
//! assert_eq!(terms.currency(), BalanceCurrency::Settlement);
//! assert_eq!(terms.frozen_amount(), Decimal::new(7000, 2));
//! assert_eq!(terms.debited_amount(), Decimal::new(7000, 2));
//! ```

use crate::domain::entities::handler::Handler;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{
    BalanceCurrency, CheckedArithmetic, Direction, HandlerId, OperationId, Rounding, Timestamp,
    div_round_cents, round_cents,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Amounts an assignment reserves, before it is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeTerms {
    currency: BalanceCurrency,
    frozen_amount: Decimal,
    debited_amount: Decimal,
    settlement_amount: Decimal,
}

impl FreezeTerms {
    /// Computes the reservation for an operation.
    ///
    /// Deals reserve `amount / rate × (1 + commission%)` in settlement
    /// currency; payouts reserve `amount × (1 + commission%)` in operation
    /// currency.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidAmount` if `amount` is not positive.
    /// Returns `DomainError::InvalidRate` if `rate` is not positive.
    /// Returns `DomainError::Arithmetic` on overflow.
    pub fn compute(
        direction: Direction,
        amount: Decimal,
        rate: Decimal,
        commission_pct: Decimal,
    ) -> DomainResult<Self> {
        Self::reserve(
            BalanceCurrency::reserved_for(direction),
            amount,
            rate,
            commission_pct,
        )
    }

    /// Computes the reservation `handler` makes for an operation.
    ///
    /// Traders follow [`FreezeTerms::compute`] with their commission.
    /// Partners reserve `amount / rate` in settlement currency for both
    /// directions.
    ///
    /// # Errors
    ///
    /// Same as [`FreezeTerms::compute`].
    pub fn compute_for(
        handler: &Handler,
        direction: Direction,
        amount: Decimal,
        rate: Decimal,
    ) -> DomainResult<Self> {
        Self::reserve(
            handler.reserved_currency(direction),
            amount,
            rate,
            handler.commission_pct(direction),
        )
    }

    fn reserve(
        currency: BalanceCurrency,
        amount: Decimal,
        rate: Decimal,
        commission_pct: Decimal,
    ) -> DomainResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::InvalidAmount(format!(
                "amount must be positive, got {amount}"
            )));
        }
        if rate <= Decimal::ZERO {
            return Err(DomainError::InvalidRate(format!(
                "rate must be positive, got {rate}"
            )));
        }

        let markup = Decimal::ONE.safe_add(commission_pct.safe_div(Decimal::ONE_HUNDRED)?)?;
        let base = match currency {
            BalanceCurrency::Settlement => amount.safe_div(rate)?,
            BalanceCurrency::Operation => amount,
        };
        let requirement = base.safe_mul(markup)?;

        Ok(Self {
            currency,
            frozen_amount: round_cents(requirement, Rounding::Down),
            debited_amount: round_cents(requirement, Rounding::Up),
            settlement_amount: div_round_cents(amount, rate, Rounding::Down)?,
        })
    }

    /// Returns the reserved balance pair.
    #[inline]
    #[must_use]
    pub fn currency(&self) -> BalanceCurrency {
        self.currency
    }

    /// Returns the reservation rounded down.
    #[inline]
    #[must_use]
    pub fn frozen_amount(&self) -> Decimal {
        self.frozen_amount
    }

    /// Returns the amount taken from the spendable balance (rounded up).
    #[inline]
    #[must_use]
    pub fn debited_amount(&self) -> Decimal {
        self.debited_amount
    }

    /// Returns the settlement-currency amount of the operation.
    #[inline]
    #[must_use]
    pub fn settlement_amount(&self) -> Decimal {
        self.settlement_amount
    }
}

/// A committed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeRecord {
    operation_id: OperationId,
    handler_id: HandlerId,
    currency: BalanceCurrency,
    frozen_amount: Decimal,
    debited_amount: Decimal,
    settlement_amount: Decimal,
    created_at: Timestamp,
}

impl FreezeRecord {
    /// Creates a record from computed terms.
    #[must_use]
    pub fn new(operation_id: OperationId, handler_id: HandlerId, terms: FreezeTerms) -> Self {
        Self {
            operation_id,
            handler_id,
            currency: terms.currency,
            frozen_amount: terms.frozen_amount,
            debited_amount: terms.debited_amount,
            settlement_amount: terms.settlement_amount,
            created_at: Timestamp::now(),
        }
    }

    /// Reconstructs a record from storage.
    #[must_use]
    pub fn from_parts(
        operation_id: OperationId,
        handler_id: HandlerId,
        currency: BalanceCurrency,
        frozen_amount: Decimal,
        debited_amount: Decimal,
        settlement_amount: Decimal,
        created_at: Timestamp,
    ) -> Self {
        Self {
            operation_id,
            handler_id,
            currency,
            frozen_amount,
            debited_amount,
            settlement_amount,
            created_at,
        }
    }

    /// Returns the operation ID.
    #[inline]
    #[must_use]
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Returns the handler ID.
    #[inline]
    #[must_use]
    pub fn handler_id(&self) -> &HandlerId {
        &self.handler_id
    }

    /// Returns the reserved balance pair.
    #[inline]
    #[must_use]
    pub fn currency(&self) -> BalanceCurrency {
        self.currency
    }

    /// Returns the reservation rounded down.
    #[inline]
    #[must_use]
    pub fn frozen_amount(&self) -> Decimal {
        self.frozen_amount
    }

    /// Returns the amount that was debited and must be restored on release.
    #[inline]
    #[must_use]
    pub fn debited_amount(&self) -> Decimal {
        self.debited_amount
    }

    /// Returns the settlement-currency amount.
    #[inline]
    #[must_use]
    pub fn settlement_amount(&self) -> Decimal {
        self.settlement_amount
    }

    /// Returns the creation time.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

impl fmt::Display for FreezeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Freeze(op={} handler={} {} frozen={} debited={})",
            self.operation_id, self.handler_id, self.currency, self.frozen_amount, self.debited_amount
        )
    }
}
