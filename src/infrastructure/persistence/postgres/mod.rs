//! # PostgreSQL Persistence
//!
//! sqlx-backed implementations of the persistence ports.

pub mod integration_log;
pub mod store;

pub use integration_log::PostgresIntegrationLog;
pub use store::PostgresStore;
