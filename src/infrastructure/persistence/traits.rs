//! # Repository Traits
//!
//! Port definitions for persistence abstraction.
//!
//! The engine needs three things from its store: row-locked read-modify-write
//! transactions on a handler ([`LedgerStore`]), aggregate counts over
//! completed operations ([`OperationHistory`]), and plain entity access. The
//! integration log port lives with the partner performance service.
//!
//! # Available Repositories
//!
//! - [`OperationRepository`]: Operation persistence and pool queries
//! - [`HandlerRepository`]: Trader and partner configuration
//! - [`MerchantLinkRepository`]: Merchant-handler relationships
//! - [`OperationHistory`]: Read-only aggregation over completed history
//! - [`AssignmentQueue`]: Persisted round-robin positions
//! - [`LedgerStore`]: Transactions holding the handler row lock
//!
//! # Examples
//!
//! ```ignore
//! use deal_router::infrastructure::persistence::traits::LedgerStore;
//!
//! async fn touch(store: &dyn LedgerStore, handler_id: &HandlerId) -> RepositoryResult<()> {
//!     let tx = store.begin(handler_id).await?;
//!     // handler row is locked until commit or drop
//!     tx.commit().await
//! }
//! ```

use crate::domain::entities::{
    AggregatorPartner, Balances, FreezeRecord, Handler, MerchantLink, Operation,
};
use crate::domain::value_objects::{
    CounterpartyId, Direction, HandlerId, MerchantId, OperationId, Timestamp,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Error type for repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Entity not found.
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Duplicate entity.
    #[error("Duplicate entity: {entity_type} with id {id} already exists")]
    Duplicate {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Optimistic locking conflict.
    #[error("Version conflict: {entity_type} with id {id} has been modified")]
    VersionConflict {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
        /// Expected version.
        expected: u64,
        /// Actual version.
        actual: u64,
    },

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error.
    #[error("Query error: {0}")]
    Query(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a duplicate error.
    #[must_use]
    pub fn duplicate(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a version conflict error.
    #[must_use]
    pub fn version_conflict(
        entity_type: &'static str,
        id: impl Into<String>,
        expected: u64,
        actual: u64,
    ) -> Self {
        Self::VersionConflict {
            entity_type,
            id: id.into(),
            expected,
            actual,
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error.
    #[must_use]
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the store itself is unreachable.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns true for not-found errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository for operations.
#[async_trait]
pub trait OperationRepository: Send + Sync + fmt::Debug {
    /// Inserts a new operation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Duplicate` if the ID exists.
    async fn insert(&self, operation: &Operation) -> RepositoryResult<()>;

    /// Finds an operation by ID.
    async fn get(&self, id: OperationId) -> RepositoryResult<Option<Operation>>;

    /// Writes an operation that holds no balance, if still at `expected_version`.
    ///
    /// Transitions that move balances go through [`LedgerTransaction`]
    /// instead.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::VersionConflict` if the stored version
    /// differs, or `RepositoryError::NotFound` if the operation is missing.
    async fn update(&self, operation: &Operation, expected_version: u64) -> RepositoryResult<()>;

    /// Returns unassigned `Created` operations expiring after `now`, oldest first.
    async fn find_assignable(&self, now: Timestamp) -> RepositoryResult<Vec<Operation>>;

    /// Returns `Created` operations whose expiry is at or before `now`.
    async fn find_expired(&self, now: Timestamp) -> RepositoryResult<Vec<Operation>>;

    /// Counts operations currently occupying a handler.
    async fn count_active_for(&self, handler_id: &HandlerId) -> RepositoryResult<u32>;
}

/// Repository for handler configuration.
///
/// Balances are written only through [`LedgerTransaction`]s.
#[async_trait]
pub trait HandlerRepository: Send + Sync + fmt::Debug {
    /// Saves a handler (insert or update, balances included).
    async fn save(&self, handler: &Handler) -> RepositoryResult<()>;

    /// Finds a handler by ID.
    async fn get(&self, id: &HandlerId) -> RepositoryResult<Option<Handler>>;

    /// Returns all internal traders, ordered by ID.
    async fn find_traders(&self) -> RepositoryResult<Vec<Handler>>;

    /// Returns all aggregator partners, ordered by priority then ID.
    async fn find_partners(&self) -> RepositoryResult<Vec<AggregatorPartner>>;

    /// Overwrites a partner's priority.
    async fn update_priority(&self, id: &HandlerId, priority: u32) -> RepositoryResult<()>;

    /// Adds routed volume to a partner's usage for the UTC day of `at`,
    /// restarting from zero when the stored usage belongs to an earlier day.
    async fn add_partner_volume(
        &self,
        id: &HandlerId,
        amount: Decimal,
        at: Timestamp,
    ) -> RepositoryResult<()>;
}

/// Repository for merchant-handler links.
#[async_trait]
pub trait MerchantLinkRepository: Send + Sync + fmt::Debug {
    /// Saves a link.
    async fn save(&self, link: &MerchantLink) -> RepositoryResult<()>;

    /// Finds the link between a merchant and a handler.
    async fn get(
        &self,
        merchant_id: &MerchantId,
        handler_id: &HandlerId,
    ) -> RepositoryResult<Option<MerchantLink>>;
}

/// Read-only aggregation over operation history.
///
/// A handler's history with a counterparty covers operations it completed or
/// currently holds.
#[async_trait]
pub trait OperationHistory: Send + Sync + fmt::Debug {
    /// Counts completed operations between a merchant and a counterparty in
    /// one direction.
    async fn count_completed(
        &self,
        merchant_id: &MerchantId,
        counterparty_id: &CounterpartyId,
        direction: Direction,
    ) -> RepositoryResult<u64>;

    /// Returns true if the handler has history with the counterparty.
    async fn has_served(
        &self,
        handler_id: &HandlerId,
        counterparty_id: &CounterpartyId,
    ) -> RepositoryResult<bool>;

    /// Counts distinct counterparties in the handler's history.
    async fn distinct_counterparties(&self, handler_id: &HandlerId) -> RepositoryResult<u64>;
}

/// Persisted round-robin positions.
#[async_trait]
pub trait AssignmentQueue: Send + Sync + fmt::Debug {
    /// Returns the last assignment time per handler.
    async fn last_assigned(&self) -> RepositoryResult<HashMap<HandlerId, Timestamp>>;

    /// Records an assignment, moving the handler to the back of the queue.
    async fn record_assignment(&self, handler_id: &HandlerId, at: Timestamp)
    -> RepositoryResult<()>;
}

/// Store that opens row-locked ledger transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Begins a transaction holding the lock on `handler_id`'s row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the handler does not exist.
    async fn begin(&self, handler_id: &HandlerId) -> RepositoryResult<Box<dyn LedgerTransaction>>;
}

/// A unit of work over one locked handler.
///
/// Dropping the transaction without calling [`commit`](Self::commit) rolls
/// every change back.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Returns the handler as read under the lock.
    fn handler(&self) -> &Handler;

    /// Writes new balances for the locked handler.
    async fn save_balances(&mut self, balances: Balances) -> RepositoryResult<()>;

    /// Reads an operation inside the transaction.
    async fn load_operation(&mut self, id: OperationId) -> RepositoryResult<Operation>;

    /// Writes an operation if its stored version still equals `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::VersionConflict` if it changed concurrently.
    async fn save_operation(
        &mut self,
        operation: &Operation,
        expected_version: u64,
    ) -> RepositoryResult<()>;

    /// Reads the freeze record of an operation.
    async fn load_freeze(&mut self, operation_id: OperationId)
    -> RepositoryResult<Option<FreezeRecord>>;

    /// Inserts a freeze record.
    async fn insert_freeze(&mut self, record: &FreezeRecord) -> RepositoryResult<()>;

    /// Deletes the freeze record of an operation.
    async fn delete_freeze(&mut self, operation_id: OperationId) -> RepositoryResult<()>;

    /// Commits every change and releases the lock.
    async fn commit(self: Box<Self>) -> RepositoryResult<()>;
}
