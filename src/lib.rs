//! # Deal Router
//!
//! Routing and settlement engine that distributes merchant deals (incoming
//! payments) and payouts across internal traders, falling back to external
//! aggregator partners when no trader can take an operation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ application                                                  │
//! │  AssignmentEngine ─▶ EligibilityFilter ─▶ TrafficClassifier  │
//! │        │                                                     │
//! │        ├─▶ OperationAssigner ─▶ balance ledger (freeze/...)  │
//! │        └─▶ FallbackRouter ─▶ PartnerClient                   │
//! │  PriorityRankingUpdater   PartnerCallbackHandler             │
//! ├──────────────────────────────────────────────────────────────┤
//! │ domain: Operation, Handler, FreezeRecord, IntegrationAttempt │
//! ├──────────────────────────────────────────────────────────────┤
//! │ infrastructure: persistence (in-memory, postgres), partners, │
//! │ callbacks, notifications, config, telemetry                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use deal_router::application::services::{AssignmentEngine, PeriodicRunner};
//!
//! let runner = PeriodicRunner::new(Arc::new(engine), config.assignment.tick_interval());
//! let handle = runner.spawn(shutdown_rx);
//! ```
//!
//! Balances only move inside a row-locked transaction on the handler, so
//! any number of engine instances can share one store.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{ApplicationError, ApplicationResult};
pub use infrastructure::config::RouterConfig;
