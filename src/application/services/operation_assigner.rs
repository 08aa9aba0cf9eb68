//! # Operation Assigner
//!
//! Commits operation state changes together with their ledger movement.
//!
//! Every method that touches a handler's balance opens one
//! [`LedgerTransaction`] on that handler, re-reads the operation inside it,
//! applies the domain transition and the balance movement, and commits both
//! or neither.
//!
//! | Method | Transition | Ledger |
//! |--------|------------|--------|
//! | [`assign`](OperationAssigner::assign) | `Created` → `Created(assigned)` | freeze |
//! | [`accept`](OperationAssigner::accept) | → `Active` | |
//! | [`mark_checking`](OperationAssigner::mark_checking) | `Active` → `Checking` | |
//! | [`complete`](OperationAssigner::complete) | → `Completed` | settle |
//! | [`cancel_by_handler`](OperationAssigner::cancel_by_handler) | → `Created(unassigned)`, history += handler | release |
//! | [`cancel`](OperationAssigner::cancel) | → `Canceled` | release if assigned |
//! | [`expire`](OperationAssigner::expire) | `Created` → `Expired` | release if assigned |
//! | [`revert_tentative`](OperationAssigner::revert_tentative) | `Created(assigned)` → `Created(unassigned)` | release |
//! | [`requeue`](OperationAssigner::requeue) | `Canceled` → `Created` | |

use crate::application::error::{RoutingError, RoutingResult};
use crate::application::services::balance_ledger::{
    freeze_in, load_own_freeze, release_in, settle_in,
};
use crate::domain::entities::{Balances, FreezeRecord, Operation};
use crate::domain::errors::DomainError;
use crate::domain::value_objects::{HandlerId, OperationId, Timestamp};
use crate::infrastructure::persistence::{
    LedgerStore, LedgerTransaction, OperationRepository, RepositoryError,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// A committed assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Operation as stored after the assignment.
    pub operation: Operation,
    /// Freeze taken for it.
    pub freeze: FreezeRecord,
    /// Handler balances after the freeze.
    pub balances: Balances,
}

/// Applies lifecycle transitions with their balance movements.
#[derive(Debug, Clone)]
pub struct OperationAssigner {
    ledger: Arc<dyn LedgerStore>,
    operations: Arc<dyn OperationRepository>,
}

impl OperationAssigner {
    /// Creates an assigner.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, operations: Arc<dyn OperationRepository>) -> Self {
        Self { ledger, operations }
    }

    /// Returns how many open operations `handler_id` holds.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Repository` on store failure.
    pub async fn active_count(&self, handler_id: &HandlerId) -> RoutingResult<u32> {
        Ok(self.operations.count_active_for(handler_id).await?)
    }

    async fn begin(&self, handler_id: &HandlerId) -> RoutingResult<Box<dyn LedgerTransaction>> {
        self.ledger.begin(handler_id).await.map_err(|e| match e {
            RepositoryError::NotFound { .. } => RoutingError::HandlerNotFound(handler_id.clone()),
            other => RoutingError::Repository(other),
        })
    }

    async fn load(&self, id: OperationId) -> RoutingResult<Operation> {
        self.operations
            .get(id)
            .await?
            .ok_or(RoutingError::OperationNotFound(id))
    }

    async fn load_in(tx: &mut dyn LedgerTransaction, id: OperationId) -> RoutingResult<Operation> {
        tx.load_operation(id)
            .await
            .map_err(|e| RoutingError::from_store(id, e))
    }

    async fn save_in(
        tx: &mut dyn LedgerTransaction,
        operation: &Operation,
        expected_version: u64,
    ) -> RoutingResult<()> {
        tx.save_operation(operation, expected_version)
            .await
            .map_err(|e| RoutingError::from_store(operation.id(), e))
    }

    async fn commit(tx: Box<dyn LedgerTransaction>, id: OperationId) -> RoutingResult<()> {
        tx.commit().await.map_err(|e| RoutingError::from_store(id, e))
    }

    /// Assigns `snapshot` to `handler_id` and freezes its requirement.
    ///
    /// The balance is re-checked under the handler lock; `reserve` must stay
    /// available on top of the debit.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::AlreadyAssigned` if the stored operation no
    /// longer matches `snapshot` or is no longer unassigned, and
    /// `RoutingError::InsufficientBalance` if the fresh balance does not
    /// cover the debit. Nothing is written on error.
    pub async fn assign(
        &self,
        snapshot: &Operation,
        handler_id: &HandlerId,
        reserve: Decimal,
    ) -> RoutingResult<Assignment> {
        let mut tx = self.begin(handler_id).await?;
        let mut operation = Self::load_in(tx.as_mut(), snapshot.id()).await?;
        if operation.version() != snapshot.version() || !operation.is_unassigned() {
            return Err(RoutingError::AlreadyAssigned(operation.id()));
        }
        let expected = operation.version();

        let freeze = freeze_in(tx.as_mut(), &operation, reserve).await?;
        operation.assign(handler_id.clone(), freeze.settlement_amount())?;
        Self::save_in(tx.as_mut(), &operation, expected).await?;
        let balances = *tx.handler().balances();
        Self::commit(tx, operation.id()).await?;

        tracing::info!(
            operation_id = %operation.id(),
            handler_id = %handler_id,
            debited = %freeze.debited_amount(),
            currency = %freeze.currency(),
            "Operation assigned"
        );
        Ok(Assignment {
            operation,
            freeze,
            balances,
        })
    }

    /// Handler accepts an assigned operation.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Domain` if the handler does not hold the
    /// operation or it is not awaiting acceptance.
    pub async fn accept(&self, id: OperationId, handler_id: &HandlerId) -> RoutingResult<Operation> {
        let mut tx = self.begin(handler_id).await?;
        let mut operation = Self::load_in(tx.as_mut(), id).await?;
        let expected = operation.version();
        operation.accept(handler_id)?;
        Self::save_in(tx.as_mut(), &operation, expected).await?;
        Self::commit(tx, id).await?;
        tracing::info!(operation_id = %id, handler_id = %handler_id, "Operation accepted");
        Ok(operation)
    }

    /// Moves an active operation to checking.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Domain` if the handler does not hold the
    /// operation or it is not active.
    pub async fn mark_checking(
        &self,
        id: OperationId,
        handler_id: &HandlerId,
    ) -> RoutingResult<Operation> {
        let mut tx = self.begin(handler_id).await?;
        let mut operation = Self::load_in(tx.as_mut(), id).await?;
        Self::require_holder(&operation, handler_id)?;
        let expected = operation.version();
        operation.mark_checking()?;
        Self::save_in(tx.as_mut(), &operation, expected).await?;
        Self::commit(tx, id).await?;
        tracing::info!(operation_id = %id, handler_id = %handler_id, "Operation checking");
        Ok(operation)
    }

    /// Completes an operation, settling its freeze.
    ///
    /// `credit` defaults to the settlement amount recorded at freeze time.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Domain` if the operation is unassigned or in a
    /// state that cannot complete, or `RoutingError::Ledger` if the freeze
    /// is missing or settling would leave `frozen` negative.
    pub async fn complete(
        &self,
        id: OperationId,
        credit: Option<Decimal>,
    ) -> RoutingResult<Operation> {
        let handler_id = self.holder_of(id).await?;
        let mut tx = self.begin(&handler_id).await?;
        let mut operation = Self::load_in(tx.as_mut(), id).await?;
        Self::require_holder(&operation, &handler_id)?;
        let expected = operation.version();

        operation.complete()?;
        let freeze = load_own_freeze(tx.as_mut(), id).await?;
        let credit = credit.unwrap_or_else(|| freeze.settlement_amount());
        settle_in(tx.as_mut(), &freeze, credit).await?;
        Self::save_in(tx.as_mut(), &operation, expected).await?;
        Self::commit(tx, id).await?;

        tracing::info!(
            operation_id = %id,
            handler_id = %handler_id,
            credit = %credit,
            "Operation completed"
        );
        Ok(operation)
    }

    /// Handler gives an operation back to the pool.
    ///
    /// The handler is appended to the previous-handler history and never
    /// receives this operation again.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Domain` if the handler does not hold the
    /// operation or it is past the point of return.
    pub async fn cancel_by_handler(
        &self,
        id: OperationId,
        handler_id: &HandlerId,
    ) -> RoutingResult<Operation> {
        let mut tx = self.begin(handler_id).await?;
        let mut operation = Self::load_in(tx.as_mut(), id).await?;
        let expected = operation.version();

        operation.return_to_pool(handler_id)?;
        let freeze = load_own_freeze(tx.as_mut(), id).await?;
        release_in(tx.as_mut(), &freeze).await?;
        Self::save_in(tx.as_mut(), &operation, expected).await?;
        Self::commit(tx, id).await?;

        tracing::info!(
            operation_id = %id,
            handler_id = %handler_id,
            released = %freeze.debited_amount(),
            "Operation returned to pool"
        );
        Ok(operation)
    }

    /// Cancels an operation for good, releasing its freeze if assigned.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Domain` if the operation cannot be canceled
    /// from its current state.
    pub async fn cancel(&self, id: OperationId) -> RoutingResult<Operation> {
        let operation = self
            .finish_with(id, |op| op.cancel().map_err(RoutingError::from))
            .await?;
        tracing::info!(operation_id = %id, "Operation canceled");
        Ok(operation)
    }

    /// Expires a `Created` operation, releasing its freeze if assigned.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Domain` if the operation is past `Created`.
    pub async fn expire(&self, id: OperationId) -> RoutingResult<Operation> {
        let operation = self
            .finish_with(id, |op| op.expire().map_err(RoutingError::from))
            .await?;
        tracing::info!(operation_id = %id, "Operation expired");
        Ok(operation)
    }

    /// Expires every `Created` operation due at `now`, returning how many
    /// were expired.
    ///
    /// Operations that change concurrently are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Repository` if the due list cannot be loaded.
    pub async fn expire_due(&self, now: Timestamp) -> RoutingResult<usize> {
        let due = self.operations.find_expired(now).await?;
        let mut expired = 0usize;
        for operation in due {
            match self.expire(operation.id()).await {
                Ok(_) => expired = expired.saturating_add(1),
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => tracing::warn!(
                    operation_id = %operation.id(),
                    error = %e,
                    "Failed to expire operation"
                ),
            }
        }
        Ok(expired)
    }

    /// Undoes a tentative assignment without touching the history.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Domain` if the operation was already accepted
    /// or `RoutingError::AlreadyAssigned` if it changed concurrently.
    pub async fn revert_tentative(
        &self,
        id: OperationId,
        handler_id: &HandlerId,
    ) -> RoutingResult<Operation> {
        let mut tx = self.begin(handler_id).await?;
        let mut operation = Self::load_in(tx.as_mut(), id).await?;
        Self::require_holder(&operation, handler_id)?;
        let expected = operation.version();

        operation.revert_assignment()?;
        let freeze = load_own_freeze(tx.as_mut(), id).await?;
        release_in(tx.as_mut(), &freeze).await?;
        Self::save_in(tx.as_mut(), &operation, expected).await?;
        Self::commit(tx, id).await?;

        tracing::debug!(operation_id = %id, handler_id = %handler_id, "Tentative assignment reverted");
        Ok(operation)
    }

    /// Stores the partner-side reference on an assigned operation.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Domain` if the handler does not hold it.
    pub async fn attach_external_ref(
        &self,
        id: OperationId,
        handler_id: &HandlerId,
        external_ref: &str,
    ) -> RoutingResult<Operation> {
        let mut tx = self.begin(handler_id).await?;
        let mut operation = Self::load_in(tx.as_mut(), id).await?;
        Self::require_holder(&operation, handler_id)?;
        let expected = operation.version();
        operation.set_external_ref(external_ref);
        Self::save_in(tx.as_mut(), &operation, expected).await?;
        Self::commit(tx, id).await?;
        Ok(operation)
    }

    /// Puts a canceled operation back in the pool.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Domain` if the operation is not canceled.
    pub async fn requeue(&self, id: OperationId) -> RoutingResult<Operation> {
        let mut operation = self.load(id).await?;
        let expected = operation.version();
        operation.requeue()?;
        self.operations
            .update(&operation, expected)
            .await
            .map_err(|e| RoutingError::from_store(id, e))?;
        tracing::info!(operation_id = %id, "Operation requeued");
        Ok(operation)
    }

    /// Applies a terminal transition, releasing the freeze when a handler
    /// holds the operation.
    async fn finish_with<F>(&self, id: OperationId, transition: F) -> RoutingResult<Operation>
    where
        F: FnOnce(&mut Operation) -> RoutingResult<()>,
    {
        let snapshot = self.load(id).await?;
        let Some(handler_id) = snapshot.handler_id().cloned() else {
            let mut operation = snapshot;
            let expected = operation.version();
            transition(&mut operation)?;
            self.operations
                .update(&operation, expected)
                .await
                .map_err(|e| RoutingError::from_store(id, e))?;
            return Ok(operation);
        };

        let mut tx = self.begin(&handler_id).await?;
        let mut operation = Self::load_in(tx.as_mut(), id).await?;
        Self::require_holder(&operation, &handler_id)?;
        let expected = operation.version();
        transition(&mut operation)?;
        let freeze = load_own_freeze(tx.as_mut(), id).await?;
        release_in(tx.as_mut(), &freeze).await?;
        Self::save_in(tx.as_mut(), &operation, expected).await?;
        Self::commit(tx, id).await?;
        Ok(operation)
    }

    async fn holder_of(&self, id: OperationId) -> RoutingResult<HandlerId> {
        let operation = self.load(id).await?;
        operation
            .handler_id()
            .cloned()
            .ok_or(RoutingError::Domain(DomainError::NotAssigned))
    }

    /// Fails with `AlreadyAssigned` if the operation moved to another
    /// handler between the unlocked read and the lock.
    fn require_holder(operation: &Operation, handler_id: &HandlerId) -> RoutingResult<()> {
        if operation.handler_id() == Some(handler_id) {
            Ok(())
        } else {
            Err(RoutingError::AlreadyAssigned(operation.id()))
        }
    }
}
