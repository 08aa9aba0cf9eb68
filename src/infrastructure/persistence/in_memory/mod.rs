//! # In-Memory Repositories
//!
//! In-memory implementations for testing without database dependencies.
//!
//! ## Available Implementations
//!
//! - [`InMemoryStore`]: Operations, handlers, links, history, queue and ledger transactions
//! - [`InMemoryIntegrationLog`]: Partner call log
//!
//! ## Thread Safety
//!
//! State sits behind `Arc<RwLock<..>>`; the integration log uses `DashMap`.

pub mod integration_log;
pub mod store;

pub use integration_log::InMemoryIntegrationLog;
pub use store::InMemoryStore;
