//! # Eligibility Rules
//!
//! Pure predicates of the admission chain deciding whether a handler may take
//! an operation. The async [`EligibilityFilter`] evaluates them in order,
//! gathering the store facts each one needs only when the previous ones pass.
//!
//! | # | Rule | Reason on failure |
//! |---|------|-------------------|
//! | 1 | enabled, not banned, takes traffic | [`RejectReason::HandlerDisabled`] |
//! | 2 | not in previous-handler history | [`RejectReason::PreviouslyHandled`] |
//! | 3 | active count below limit | [`RejectReason::ConcurrencyLimit`] |
//! | 4 | balance covers debit plus pending | [`RejectReason::InsufficientBalance`] |
//! | 5 | merchant link allows direction | [`RejectReason::MerchantLinkDisabled`] |
//! | 6 | max amount and category filters | [`RejectReason::AmountAboveLimit`], [`RejectReason::CategoryNotAccepted`] |
//! | 7 | counterparty quota | [`RejectReason::CounterpartyRequired`], [`RejectReason::CounterpartyQuotaExhausted`] |
//! | 8 | traffic tier | [`RejectReason::TierNotAccepted`] |
//!
//! [`EligibilityFilter`]: crate::application::services::eligibility::EligibilityFilter

use crate::domain::entities::{EligibilityProfile, MerchantLink, Operation};
use crate::domain::value_objects::{CheckedArithmetic, TrafficTier};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a handler was rejected for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// Disabled, banned, or not taking traffic.
    HandlerDisabled,
    /// Handler returned this operation before.
    PreviouslyHandled,
    /// Handler is at its concurrency limit.
    ConcurrencyLimit,
    /// Balance does not cover the debit plus pending commitments.
    InsufficientBalance,
    /// No merchant link, or the link blocks this direction.
    MerchantLinkDisabled,
    /// Amount exceeds the handler's max-amount filter.
    AmountAboveLimit,
    /// Category not in the handler's list.
    CategoryNotAccepted,
    /// Counterparty quota enabled but the operation has no counterparty.
    CounterpartyRequired,
    /// New counterparty and the quota is used up.
    CounterpartyQuotaExhausted,
    /// Traffic tier not accepted.
    TierNotAccepted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HandlerDisabled => "HANDLER_DISABLED",
            Self::PreviouslyHandled => "PREVIOUSLY_HANDLED",
            Self::ConcurrencyLimit => "CONCURRENCY_LIMIT",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::MerchantLinkDisabled => "MERCHANT_LINK_DISABLED",
            Self::AmountAboveLimit => "AMOUNT_ABOVE_LIMIT",
            Self::CategoryNotAccepted => "CATEGORY_NOT_ACCEPTED",
            Self::CounterpartyRequired => "COUNTERPARTY_REQUIRED",
            Self::CounterpartyQuotaExhausted => "COUNTERPARTY_QUOTA_EXHAUSTED",
            Self::TierNotAccepted => "TIER_NOT_ACCEPTED",
        };
        write!(f, "{s}")
    }
}

/// Result of evaluating the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// All rules passed.
    Eligible,
    /// First failing rule.
    Rejected(RejectReason),
}

impl Verdict {
    /// Returns true if eligible.
    #[inline]
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    /// Returns the rejection reason, if any.
    #[inline]
    #[must_use]
    pub const fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Eligible => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }
}

/// Outcome of a single rule.
pub type RuleResult = Result<(), RejectReason>;

/// Rule 1: handler switched on.
pub fn check_status(profile: &EligibilityProfile<'_>) -> RuleResult {
    if profile.enabled && !profile.banned && profile.accepts_traffic {
        Ok(())
    } else {
        Err(RejectReason::HandlerDisabled)
    }
}

/// Rule 2: exclusion after a return is permanent.
pub fn check_history(operation: &Operation, profile: &EligibilityProfile<'_>) -> RuleResult {
    if operation.was_handled_by(profile.id) {
        Err(RejectReason::PreviouslyHandled)
    } else {
        Ok(())
    }
}

/// Rule 3: concurrency limit.
pub fn check_concurrency(active_count: u32, profile: &EligibilityProfile<'_>) -> RuleResult {
    if active_count < profile.max_concurrent {
        Ok(())
    } else {
        Err(RejectReason::ConcurrencyLimit)
    }
}

/// Rule 4: `available ≥ debit + pending`.
pub fn check_balance(available: Decimal, debit: Decimal, pending: Decimal) -> RuleResult {
    match debit.safe_add(pending) {
        Ok(required) if available >= required => Ok(()),
        _ => Err(RejectReason::InsufficientBalance),
    }
}

/// Rule 5: merchant link.
pub fn check_merchant_link(operation: &Operation, link: Option<&MerchantLink>) -> RuleResult {
    match link {
        Some(link) if link.allows(operation.direction()) => Ok(()),
        _ => Err(RejectReason::MerchantLinkDisabled),
    }
}

/// Rule 6: amount and category filters.
pub fn check_operation_filters(
    operation: &Operation,
    profile: &EligibilityProfile<'_>,
) -> RuleResult {
    if !profile.filters.accepts_amount(operation.amount()) {
        return Err(RejectReason::AmountAboveLimit);
    }
    if !profile.filters.accepts_category(operation.category()) {
        return Err(RejectReason::CategoryNotAccepted);
    }
    Ok(())
}

/// Rule 7: counterparty quota, once its facts are known.
///
/// `has_served` grandfathers known counterparties; otherwise the distinct
/// count must still be below the quota.
pub fn check_counterparty_quota(
    profile: &EligibilityProfile<'_>,
    has_served: bool,
    distinct_counterparties: u64,
) -> RuleResult {
    if has_served || distinct_counterparties < u64::from(profile.traffic_filter.max_counterparties)
    {
        Ok(())
    } else {
        Err(RejectReason::CounterpartyQuotaExhausted)
    }
}

/// Rule 8: tier filter.
pub fn check_tier(profile: &EligibilityProfile<'_>, tier: TrafficTier) -> RuleResult {
    if profile.filters.accepts_tier(tier) {
        Ok(())
    } else {
        Err(RejectReason::TierNotAccepted)
    }
}
