//! # Persistence Layer
//!
//! Repository ports and their implementations.
//!
//! ## Repository Traits (Ports)
//!
//! - [`OperationRepository`]: Operations and pool queries
//! - [`HandlerRepository`]: Trader and partner configuration
//! - [`MerchantLinkRepository`]: Merchant-handler relationships
//! - [`OperationHistory`]: Aggregate counts over history
//! - [`AssignmentQueue`]: Persisted round-robin positions
//! - [`LedgerStore`]: Row-locked ledger transactions
//!
//! ## Implementations
//!
//! - `in_memory`: In-memory implementations for tests and single-process runs
//! - `postgres`: PostgreSQL implementations

pub mod in_memory;
pub mod postgres;
pub mod traits;

pub use in_memory::{InMemoryIntegrationLog, InMemoryStore};
pub use postgres::{PostgresIntegrationLog, PostgresStore};
pub use traits::{
    AssignmentQueue, HandlerRepository, LedgerStore, LedgerTransaction, MerchantLinkRepository,
    OperationHistory, OperationRepository, RepositoryError, RepositoryResult,
};
