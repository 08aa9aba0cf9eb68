//! # Balance Ledger
//!
//! Atomic freeze, release and settle over a handler's two balance pairs.
//!
//! Every call runs inside one [`LedgerTransaction`] holding the handler row
//! lock. Either all of its writes commit or none do.
//!
//! # Movements
//!
//! | Call | `available` | `frozen` | settlement `available` |
//! |------|-------------|----------|------------------------|
//! | freeze | `- debited` | `+ debited` | |
//! | release | `+ debited` | `- debited` | |
//! | settle | | `- debited` | `+ credit` |
//!
//! Release and settle use the debited amount stored on the
//! [`FreezeRecord`], so freeze followed by release is an exact inverse even
//! if commission settings changed in between.
//!
//! The `apply_*` functions perform the arithmetic on a [`Balances`] value and
//! are shared with the operation assigner, which moves balances and
//! operation state in the same transaction.

use crate::application::error::{LedgerError, LedgerResult};
use crate::domain::entities::{Balances, FreezeRecord, FreezeTerms, Operation};
use crate::domain::value_objects::{BalanceCurrency, CheckedArithmetic, HandlerId, OperationId};
use crate::infrastructure::persistence::{LedgerStore, LedgerTransaction};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Debits `record.debited_amount` from `available` into `frozen`.
///
/// `reserve` is an extra amount that must remain covered on top of the
/// debit.
///
/// # Errors
///
/// Returns `LedgerError::InsufficientBalance` if `available` does not cover
/// the debit plus `reserve`.
pub fn apply_freeze(
    balances: &mut Balances,
    record: &FreezeRecord,
    reserve: Decimal,
) -> LedgerResult<()> {
    let pair = balances.pair_mut(record.currency());
    let required = record.debited_amount().safe_add(reserve)?;
    if pair.available < required {
        return Err(LedgerError::insufficient_balance(required, pair.available));
    }
    pair.available = pair.available.safe_sub(record.debited_amount())?;
    pair.frozen = pair.frozen.safe_add(record.debited_amount())?;
    Ok(())
}

/// Returns `record.debited_amount` from `frozen` to `available`.
///
/// # Errors
///
/// Returns `LedgerError::LedgerInconsistency` if `frozen` would go negative.
pub fn apply_release(balances: &mut Balances, record: &FreezeRecord) -> LedgerResult<()> {
    let pair = balances.pair_mut(record.currency());
    let frozen = unfreeze(pair.frozen, record)?;
    pair.available = pair.available.safe_add(record.debited_amount())?;
    pair.frozen = frozen;
    Ok(())
}

/// Consumes the freeze and credits `credit` to settlement `available`.
///
/// # Errors
///
/// Returns `LedgerError::LedgerInconsistency` if `frozen` would go negative
/// or `credit` is negative.
pub fn apply_settle(
    balances: &mut Balances,
    record: &FreezeRecord,
    credit: Decimal,
) -> LedgerResult<()> {
    if credit.is_sign_negative() {
        return Err(LedgerError::inconsistency(format!(
            "negative settlement credit {credit} for operation {}",
            record.operation_id()
        )));
    }
    let pair = balances.pair_mut(record.currency());
    pair.frozen = unfreeze(pair.frozen, record)?;
    let settlement = balances.pair_mut(BalanceCurrency::Settlement);
    settlement.available = settlement.available.safe_add(credit)?;
    Ok(())
}

fn unfreeze(frozen: Decimal, record: &FreezeRecord) -> LedgerResult<Decimal> {
    let remaining = frozen.safe_sub(record.debited_amount())?;
    if remaining < Decimal::ZERO {
        return Err(LedgerError::inconsistency(format!(
            "frozen {frozen} is below debited {} for operation {}",
            record.debited_amount(),
            record.operation_id()
        )));
    }
    Ok(remaining)
}

/// Computes and applies a freeze for `operation` against the locked handler,
/// then stages the record and new balances on the transaction.
///
/// # Errors
///
/// Returns `LedgerError::Domain` for invalid amount or rate,
/// `LedgerError::InsufficientBalance` if the handler cannot cover it, or
/// `LedgerError::Repository` on store failure.
pub async fn freeze_in(
    tx: &mut dyn LedgerTransaction,
    operation: &Operation,
    reserve: Decimal,
) -> LedgerResult<FreezeRecord> {
    let handler = tx.handler();
    let terms = FreezeTerms::compute_for(
        handler,
        operation.direction(),
        operation.amount(),
        operation.rate(),
    )?;
    let record = FreezeRecord::new(operation.id(), handler.id().clone(), terms);
    let mut balances = *handler.balances();
    apply_freeze(&mut balances, &record, reserve)?;
    tx.insert_freeze(&record).await?;
    tx.save_balances(balances).await?;
    Ok(record)
}

/// Loads the freeze for `operation_id` held by the locked handler.
///
/// # Errors
///
/// Returns `LedgerError::FreezeNotFound` if there is none, or
/// `LedgerError::ForeignFreeze` if another handler holds it.
pub async fn load_own_freeze(
    tx: &mut dyn LedgerTransaction,
    operation_id: OperationId,
) -> LedgerResult<FreezeRecord> {
    let record = tx
        .load_freeze(operation_id)
        .await?
        .ok_or(LedgerError::FreezeNotFound(operation_id))?;
    if record.handler_id() != tx.handler().id() {
        return Err(LedgerError::ForeignFreeze {
            operation_id,
            holder: record.handler_id().clone(),
        });
    }
    Ok(record)
}

/// Releases `record` on the locked handler and deletes it.
///
/// # Errors
///
/// Returns `LedgerError::LedgerInconsistency` or `LedgerError::Repository`.
pub async fn release_in(
    tx: &mut dyn LedgerTransaction,
    record: &FreezeRecord,
) -> LedgerResult<Balances> {
    let mut balances = *tx.handler().balances();
    apply_release(&mut balances, record)?;
    tx.delete_freeze(record.operation_id()).await?;
    tx.save_balances(balances).await?;
    Ok(balances)
}

/// Settles `record` on the locked handler and deletes it.
///
/// # Errors
///
/// Returns `LedgerError::LedgerInconsistency` or `LedgerError::Repository`.
pub async fn settle_in(
    tx: &mut dyn LedgerTransaction,
    record: &FreezeRecord,
    credit: Decimal,
) -> LedgerResult<Balances> {
    let mut balances = *tx.handler().balances();
    apply_settle(&mut balances, record, credit)?;
    tx.delete_freeze(record.operation_id()).await?;
    tx.save_balances(balances).await?;
    Ok(balances)
}

/// Standalone ledger calls, each in its own transaction.
#[derive(Debug, Clone)]
pub struct BalanceLedger {
    store: Arc<dyn LedgerStore>,
}

impl BalanceLedger {
    /// Creates a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Freezes the requirement of `operation` on `handler_id`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InsufficientBalance` if the handler's available
    /// balance does not cover the debit; nothing is written in that case.
    pub async fn freeze(
        &self,
        handler_id: &HandlerId,
        operation: &Operation,
    ) -> LedgerResult<FreezeRecord> {
        let mut tx = self.store.begin(handler_id).await?;
        let record = freeze_in(tx.as_mut(), operation, Decimal::ZERO).await?;
        tx.commit().await?;
        tracing::debug!(
            handler_id = %handler_id,
            operation_id = %operation.id(),
            debited = %record.debited_amount(),
            currency = %record.currency(),
            "Balance frozen"
        );
        Ok(record)
    }

    /// Returns the debited amount of `record` to `available`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::FreezeNotFound` if the record was already
    /// consumed, or `LedgerError::LedgerInconsistency` if `frozen` would go
    /// negative.
    pub async fn release(&self, record: &FreezeRecord) -> LedgerResult<Balances> {
        let mut tx = self.store.begin(record.handler_id()).await?;
        let stored = load_own_freeze(tx.as_mut(), record.operation_id()).await?;
        let balances = release_in(tx.as_mut(), &stored).await?;
        tx.commit().await?;
        tracing::debug!(
            handler_id = %record.handler_id(),
            operation_id = %record.operation_id(),
            released = %stored.debited_amount(),
            "Balance released"
        );
        Ok(balances)
    }

    /// Consumes `record` and credits `credit` to settlement `available`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::FreezeNotFound` if the record was already
    /// consumed, or `LedgerError::LedgerInconsistency` if `frozen` would go
    /// negative.
    pub async fn settle(&self, record: &FreezeRecord, credit: Decimal) -> LedgerResult<Balances> {
        let mut tx = self.store.begin(record.handler_id()).await?;
        let stored = load_own_freeze(tx.as_mut(), record.operation_id()).await?;
        let balances = settle_in(tx.as_mut(), &stored, credit).await?;
        tx.commit().await?;
        tracing::debug!(
            handler_id = %record.handler_id(),
            operation_id = %record.operation_id(),
            credit = %credit,
            "Balance settled"
        );
        Ok(balances)
    }
}
