//! # Domain Entities
//!
//! ## Aggregates
//!
//! - [`Operation`]: Deal or payout with its lifecycle state machine
//! - [`Handler`]: Internal trader or aggregator partner
//!
//! ## Entities
//!
//! - [`FreezeRecord`]: Balance reservation held by an assigned operation
//! - [`MerchantLink`]: Merchant-handler relationship
//! - [`IntegrationAttempt`]: Partner call log entry
//! - [`AggregatorStats`]: Rolling partner statistics

pub mod freeze_record;
pub mod handler;
pub mod integration_attempt;
pub mod merchant_link;
pub mod operation;

pub use freeze_record::{FreezeRecord, FreezeTerms};
pub use handler::{
    AggregatorPartner, BalancePair, Balances, EligibilityProfile, Handler, HandlerFilters,
    HandlerKind, TrafficFilterSettings, Trader,
};
pub use integration_attempt::{AggregatorStats, DEFAULT_STATS_WINDOW_HOURS, IntegrationAttempt};
pub use merchant_link::MerchantLink;
pub use operation::{Operation, OperationBuilder};
