//! # Application Services
//!
//! Services that orchestrate domain logic and infrastructure.
//!
//! - [`BalanceLedger`]: Freeze, release and settle under the handler lock
//! - [`TrafficClassifier`]: Merchant/counterparty history tiers
//! - [`EligibilityFilter`]: Admission chain per operation and handler
//! - [`OperationAssigner`]: Lifecycle transitions with their ledger movement
//! - [`AssignmentEngine`]: Periodic round-robin distribution
//! - [`FallbackRouter`]: Priority-ordered aggregator partner fallback
//! - [`PriorityRankingUpdater`]: Periodic partner re-ranking
//! - [`PartnerCallbackHandler`]: Verified partner status callbacks
//! - [`PeriodicRunner`]: Skip-if-running scheduler for [`PeriodicTask`]s

pub mod assignment_engine;
pub mod balance_ledger;
pub mod callback_handler;
pub mod candidate_pool;
pub mod eligibility;
pub mod expiry;
pub mod fallback_router;
pub mod operation_assigner;
pub mod priority_ranking;
pub mod scheduler;
pub mod traffic_classifier;

pub use assignment_engine::{AssignmentEngine, TickReport};
pub use balance_ledger::BalanceLedger;
pub use callback_handler::{CallbackKind, PartnerCallbackHandler};
pub use candidate_pool::CandidatePool;
pub use eligibility::{EligibilityFilter, OperationFacts};
pub use expiry::ExpirySweep;
pub use fallback_router::{DEFAULT_FALLBACK_TIMEOUT_MS, FallbackRouter, RoutedDeal};
pub use operation_assigner::{Assignment, OperationAssigner};
pub use priority_ranking::{PriorityRankingUpdater, RankedPartner, rank_partners};
pub use scheduler::{PeriodicRunner, PeriodicTask, RunOutcome};
pub use traffic_classifier::TrafficClassifier;
