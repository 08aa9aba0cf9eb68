//! # Domain Services
//!
//! Domain logic that doesn't naturally belong to a single entity.
//!
//! ## Services
//!
//! - [`eligibility`]: Ordered admission rules for handler candidates
//! - [`partner_performance::PartnerPerformanceTracker`]: Rolling partner call statistics

pub mod eligibility;
pub mod partner_performance;

pub use eligibility::{RejectReason, Verdict};
pub use partner_performance::{
    IntegrationLogRepository, PartnerPerformanceError, PartnerPerformanceResult,
    PartnerPerformanceTracker,
};
