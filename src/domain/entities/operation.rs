//! # Operation Aggregate
//!
//! A deal (money in) or payout (money out) routed to a handler.
//!
//! # State Machine
//!
//! ```text
//! Created(unassigned) → Created(assigned) → Active → Checking → Completed
//!          ↑                   │               │         │
//!          └───────────────────┴───────────────┴─────────┘  return to pool
//! ```
//!
//! Returning to the pool appends the handler to the previous-handler history,
//! which is append-only: a handler listed there never receives the operation
//! again.
//!
//! # Examples
//!
//! ```
//! use deal_router::domain::entities::operation::OperationBuilder;
//! use deal_router::domain::value_objects::{Direction, MerchantId, Timestamp};
//! use rust_decimal::Decimal;
//!
//! let op = OperationBuilder::new(
//!     MerchantId::new("shop-1"),
//!     Direction::In,
//!     Decimal::new(7000, 0),
//!     Decimal::new(100, 0),
//!     Timestamp::now().add_secs(900),
//! )
//! .build()
//! .unwrap();
//!
//! assert!(op.is_unassigned());
//! ```

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{
    CounterpartyId, Direction, HandlerId, MerchantId, OperationId, OperationStatus, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A money-movement request.
///
/// # Invariants
///
/// - At most one handler at a time
/// - `previous_handlers` only grows
/// - `amount` and `rate` are positive
/// - `version` increases on every mutation (optimistic locking)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    id: OperationId,
    merchant_id: MerchantId,
    direction: Direction,
    /// Amount in operation currency.
    amount: Decimal,
    /// Operation-currency units per settlement unit, snapshotted at creation.
    rate: Decimal,
    /// Payment method category.
    category: Option<String>,
    counterparty_id: Option<CounterpartyId>,
    handler_id: Option<HandlerId>,
    status: OperationStatus,
    previous_handlers: Vec<HandlerId>,
    /// Settlement-currency amount fixed at assignment.
    settlement_amount: Option<Decimal>,
    /// Partner-side reference for operations routed to an aggregator.
    external_ref: Option<String>,
    version: u64,
    created_at: Timestamp,
    expires_at: Timestamp,
    updated_at: Timestamp,
}

impl Operation {
    /// Returns a builder for a new operation.
    #[must_use]
    pub fn builder(
        merchant_id: MerchantId,
        direction: Direction,
        amount: Decimal,
        rate: Decimal,
        expires_at: Timestamp,
    ) -> OperationBuilder {
        OperationBuilder::new(merchant_id, direction, amount, rate, expires_at)
    }

    /// Reconstructs an operation from storage without validation.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: OperationId,
        merchant_id: MerchantId,
        direction: Direction,
        amount: Decimal,
        rate: Decimal,
        category: Option<String>,
        counterparty_id: Option<CounterpartyId>,
        handler_id: Option<HandlerId>,
        status: OperationStatus,
        previous_handlers: Vec<HandlerId>,
        settlement_amount: Option<Decimal>,
        external_ref: Option<String>,
        version: u64,
        created_at: Timestamp,
        expires_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            merchant_id,
            direction,
            amount,
            rate,
            category,
            counterparty_id,
            handler_id,
            status,
            previous_handlers,
            settlement_amount,
            external_ref,
            version,
            created_at,
            expires_at,
            updated_at,
        }
    }

    fn transition_to(&mut self, target: OperationStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
        self.version = self.version.saturating_add(1);
    }

    fn require_handler(&self, handler_id: &HandlerId) -> DomainResult<()> {
        match &self.handler_id {
            Some(current) if current == handler_id => Ok(()),
            Some(_) => Err(DomainError::HandlerMismatch(handler_id.clone())),
            None => Err(DomainError::NotAssigned),
        }
    }

    // ========== Accessors ==========

    /// Returns the operation ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Returns the merchant ID.
    #[inline]
    #[must_use]
    pub fn merchant_id(&self) -> &MerchantId {
        &self.merchant_id
    }

    /// Returns the direction.
    #[inline]
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the amount in operation currency.
    #[inline]
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the exchange-rate snapshot.
    #[inline]
    #[must_use]
    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Returns the payment-method category.
    #[inline]
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Returns the counterparty, if the merchant supplied one.
    #[inline]
    #[must_use]
    pub fn counterparty_id(&self) -> Option<&CounterpartyId> {
        self.counterparty_id.as_ref()
    }

    /// Returns the current handler.
    #[inline]
    #[must_use]
    pub fn handler_id(&self) -> Option<&HandlerId> {
        self.handler_id.as_ref()
    }

    /// Returns the status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// Returns handlers that previously returned this operation.
    #[inline]
    #[must_use]
    pub fn previous_handlers(&self) -> &[HandlerId] {
        &self.previous_handlers
    }

    /// Returns the settlement amount fixed at assignment.
    #[inline]
    #[must_use]
    pub fn settlement_amount(&self) -> Option<Decimal> {
        self.settlement_amount
    }

    /// Returns the partner-side reference.
    #[inline]
    #[must_use]
    pub fn external_ref(&self) -> Option<&str> {
        self.external_ref.as_deref()
    }

    /// Returns the version for optimistic locking.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the creation time.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns the expiry time.
    #[inline]
    #[must_use]
    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// Returns the last update time.
    #[inline]
    #[must_use]
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    // ========== Queries ==========

    /// Returns true if the operation is waiting in the pool.
    #[must_use]
    pub fn is_unassigned(&self) -> bool {
        self.status == OperationStatus::Created && self.handler_id.is_none()
    }

    /// Returns true if the operation is in the pool and not expired at `now`.
    #[must_use]
    pub fn is_assignable_at(&self, now: Timestamp) -> bool {
        self.is_unassigned() && self.expires_at.is_after(&now)
    }

    /// Returns true if `handler_id` returned this operation before.
    #[must_use]
    pub fn was_handled_by(&self, handler_id: &HandlerId) -> bool {
        self.previous_handlers.contains(handler_id)
    }

    /// Returns true if the operation counts against its handler's concurrency.
    #[must_use]
    pub fn occupies_handler(&self) -> bool {
        self.handler_id.is_some()
            && (self.status == OperationStatus::Created || self.status.is_in_progress())
    }

    // ========== Transitions ==========

    /// Assigns the operation to a handler.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyAssigned` if a handler is already set.
    /// Returns `DomainError::InvalidStateTransition` if not in `Created`.
    pub fn assign(&mut self, handler_id: HandlerId, settlement_amount: Decimal) -> DomainResult<()> {
        if let Some(current) = &self.handler_id {
            return Err(DomainError::AlreadyAssigned(current.clone()));
        }
        if self.status != OperationStatus::Created {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: OperationStatus::Created,
            });
        }
        self.handler_id = Some(handler_id);
        self.settlement_amount = Some(settlement_amount);
        self.touch();
        Ok(())
    }

    /// Undoes a tentative assignment without touching the history.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotAssigned` if there is no handler.
    /// Returns `DomainError::InvalidStateTransition` if no longer in `Created`.
    pub fn revert_assignment(&mut self) -> DomainResult<HandlerId> {
        if self.status != OperationStatus::Created {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: OperationStatus::Created,
            });
        }
        let handler = self.handler_id.take().ok_or(DomainError::NotAssigned)?;
        self.settlement_amount = None;
        self.external_ref = None;
        self.touch();
        Ok(handler)
    }

    /// Handler accepts the assignment.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::HandlerMismatch` or `DomainError::NotAssigned`
    /// if `handler_id` does not hold the operation, or
    /// `DomainError::InvalidStateTransition` if not in `Created`.
    pub fn accept(&mut self, handler_id: &HandlerId) -> DomainResult<()> {
        self.require_handler(handler_id)?;
        self.transition_to(OperationStatus::Active)
    }

    /// Payment claimed; move to verification.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidStateTransition` if not `Active`.
    pub fn mark_checking(&mut self) -> DomainResult<()> {
        self.transition_to(OperationStatus::Checking)
    }

    /// Opens a dispute.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidStateTransition` if not `Active` or `Checking`.
    pub fn open_dispute(&mut self) -> DomainResult<()> {
        self.transition_to(OperationStatus::Dispute)
    }

    /// Marks the operation completed.
    ///
    /// Partner-routed operations may complete straight from `Created` once the
    /// partner confirms, so an assigned `Created` operation is activated first.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotAssigned` if there is no handler, or
    /// `DomainError::InvalidStateTransition` from a terminal or canceled state.
    pub fn complete(&mut self) -> DomainResult<()> {
        if self.handler_id.is_none() {
            return Err(DomainError::NotAssigned);
        }
        if self.status == OperationStatus::Created {
            self.transition_to(OperationStatus::Active)?;
        }
        self.transition_to(OperationStatus::Completed)
    }

    /// Handler gives the operation back: it returns to the unassigned pool
    /// and the handler is excluded from it permanently.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::HandlerMismatch` or `DomainError::NotAssigned`
    /// if `handler_id` does not hold the operation, or
    /// `DomainError::InvalidStateTransition` if it cannot be canceled.
    pub fn return_to_pool(&mut self, handler_id: &HandlerId) -> DomainResult<()> {
        self.require_handler(handler_id)?;
        if self.status != OperationStatus::Created
            && !self.status.can_transition_to(OperationStatus::Canceled)
        {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: OperationStatus::Created,
            });
        }
        self.previous_handlers.push(handler_id.clone());
        self.handler_id = None;
        self.settlement_amount = None;
        self.external_ref = None;
        self.status = OperationStatus::Created;
        self.touch();
        Ok(())
    }

    /// Cancels the operation. The handler reference is kept for the record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidStateTransition` from a terminal state.
    pub fn cancel(&mut self) -> DomainResult<()> {
        self.transition_to(OperationStatus::Canceled)
    }

    /// Re-queues a canceled operation into the pool.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidStateTransition` if not `Canceled`.
    pub fn requeue(&mut self) -> DomainResult<()> {
        self.transition_to(OperationStatus::Created)?;
        if let Some(previous) = self.handler_id.take() {
            self.previous_handlers.push(previous);
        }
        self.settlement_amount = None;
        self.external_ref = None;
        Ok(())
    }

    /// Marks the operation expired.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidStateTransition` if not `Created`.
    pub fn expire(&mut self) -> DomainResult<()> {
        self.transition_to(OperationStatus::Expired)
    }

    /// Stores the partner-side reference.
    pub fn set_external_ref(&mut self, external_ref: impl Into<String>) {
        self.external_ref = Some(external_ref.into());
        self.touch();
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Operation({} {} {} {})",
            self.id, self.direction, self.amount, self.status
        )
    }
}

/// Builder for new [`Operation`]s.
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    id: OperationId,
    merchant_id: MerchantId,
    direction: Direction,
    amount: Decimal,
    rate: Decimal,
    category: Option<String>,
    counterparty_id: Option<CounterpartyId>,
    created_at: Option<Timestamp>,
    expires_at: Timestamp,
}

impl OperationBuilder {
    /// Creates a builder with the required fields.
    #[must_use]
    pub fn new(
        merchant_id: MerchantId,
        direction: Direction,
        amount: Decimal,
        rate: Decimal,
        expires_at: Timestamp,
    ) -> Self {
        Self {
            id: OperationId::new_v4(),
            merchant_id,
            direction,
            amount,
            rate,
            category: None,
            counterparty_id: None,
            created_at: None,
            expires_at,
        }
    }

    /// Sets an explicit ID.
    #[must_use]
    pub fn id(mut self, id: OperationId) -> Self {
        self.id = id;
        self
    }

    /// Sets the payment-method category.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the counterparty.
    #[must_use]
    pub fn counterparty(mut self, counterparty_id: CounterpartyId) -> Self {
        self.counterparty_id = Some(counterparty_id);
        self
    }

    /// Overrides the creation time.
    #[must_use]
    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds the operation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidAmount` if the amount is not positive.
    /// Returns `DomainError::InvalidRate` if the rate is not positive.
    pub fn build(self) -> DomainResult<Operation> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::InvalidAmount(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.rate <= Decimal::ZERO {
            return Err(DomainError::InvalidRate(format!(
                "rate must be positive, got {}",
                self.rate
            )));
        }
        let created_at = self.created_at.unwrap_or_else(Timestamp::now);
        Ok(Operation {
            id: self.id,
            merchant_id: self.merchant_id,
            direction: self.direction,
            amount: self.amount,
            rate: self.rate,
            category: self.category,
            counterparty_id: self.counterparty_id,
            handler_id: None,
            status: OperationStatus::Created,
            previous_handlers: Vec::new(),
            settlement_amount: None,
            external_ref: None,
            version: 1,
            created_at,
            expires_at: self.expires_at,
            updated_at: created_at,
        })
    }
}
