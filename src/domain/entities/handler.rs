//! # Handler Entity
//!
//! Internal traders and external aggregator partners behind one tagged type.
//!
//! Both variants hold two balance pairs (operation and settlement currency),
//! an enabled flag and a concurrency limit. The eligibility chain only looks
//! at the shared [`EligibilityProfile`] projection and never branches on the
//! variant itself.
//!
//! # Examples
//!
//! ```
//! use deal_router::domain::entities::handler::{Handler, Trader};
//! use deal_router::domain::value_objects::{BalanceCurrency, HandlerId};
//! use rust_decimal::Decimal;
//!
//! let trader = Trader::new(HandlerId::new("t-1"))
//!     .with_balance(BalanceCurrency::Settlement, Decimal::new(10_000, 0));
//! let handler = Handler::Internal(trader);
//!
//! let profile = handler.profile();
//! assert!(profile.filters.is_default());
//! ```

use crate::domain::value_objects::{
    BalanceCurrency, CheckedArithmetic, Direction, HandlerId, Timestamp, TrafficTier,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Default per-handler concurrency limit.
pub const DEFAULT_MAX_CONCURRENT: u32 = 10;

/// Default partner call timeout in milliseconds.
pub const DEFAULT_PARTNER_TIMEOUT_MS: u64 = 5_000;

/// Default partner SLA threshold in milliseconds.
pub const DEFAULT_PARTNER_SLA_MS: u64 = 2_000;

/// Spendable and reserved funds in one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalancePair {
    /// Spendable funds.
    pub available: Decimal,
    /// Funds reserved for assigned operations.
    pub frozen: Decimal,
}

impl BalancePair {
    /// Creates a balance pair.
    #[must_use]
    pub const fn new(available: Decimal, frozen: Decimal) -> Self {
        Self { available, frozen }
    }

    /// Returns `available + frozen`.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available.safe_add(self.frozen).unwrap_or(Decimal::MAX)
    }
}

/// Both balance pairs of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balances {
    /// Operation (local) currency.
    pub operation: BalancePair,
    /// Settlement currency.
    pub settlement: BalancePair,
}

impl Balances {
    /// Returns the pair for a currency.
    #[must_use]
    pub fn pair(&self, currency: BalanceCurrency) -> BalancePair {
        match currency {
            BalanceCurrency::Operation => self.operation,
            BalanceCurrency::Settlement => self.settlement,
        }
    }

    /// Returns a mutable reference to the pair for a currency.
    pub fn pair_mut(&mut self, currency: BalanceCurrency) -> &mut BalancePair {
        match currency {
            BalanceCurrency::Operation => &mut self.operation,
            BalanceCurrency::Settlement => &mut self.settlement,
        }
    }
}

/// Per-operation admission filters configured by a trader.
///
/// Tier filtering follows one rule: a handler whose filters are all unset
/// accepts every tier; once any filter is set, only the listed tiers pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HandlerFilters {
    /// Largest operation amount accepted.
    pub max_amount: Option<Decimal>,
    /// Accepted payment categories; empty means any.
    pub categories: BTreeSet<String>,
    /// Accepted traffic tiers.
    pub traffic_tiers: BTreeSet<TrafficTier>,
}

impl HandlerFilters {
    /// Returns true if nothing is configured.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.max_amount.is_none() && self.categories.is_empty() && self.traffic_tiers.is_empty()
    }

    /// Returns true if `amount` is within the max-amount filter.
    #[must_use]
    pub fn accepts_amount(&self, amount: Decimal) -> bool {
        self.max_amount.is_none_or(|max| amount <= max)
    }

    /// Returns true if `category` is accepted.
    ///
    /// An operation without a category only passes when no category filter
    /// is configured.
    #[must_use]
    pub fn accepts_category(&self, category: Option<&str>) -> bool {
        if self.categories.is_empty() {
            return true;
        }
        category.is_some_and(|c| self.categories.contains(c))
    }

    /// Returns true if `tier` is accepted.
    #[must_use]
    pub fn accepts_tier(&self, tier: TrafficTier) -> bool {
        self.is_default() || self.traffic_tiers.contains(&tier)
    }

    /// Sets the max-amount filter.
    #[must_use]
    pub fn with_max_amount(mut self, max: Decimal) -> Self {
        self.max_amount = Some(max);
        self
    }

    /// Adds an accepted category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    /// Adds an accepted traffic tier.
    #[must_use]
    pub fn with_tier(mut self, tier: TrafficTier) -> Self {
        self.traffic_tiers.insert(tier);
        self
    }
}

/// Limits on how many distinct counterparties a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrafficFilterSettings {
    /// Whether the counterparty quota applies.
    pub enabled: bool,
    /// Maximum distinct counterparties served.
    pub max_counterparties: u32,
}

impl TrafficFilterSettings {
    /// Enabled quota with the given limit.
    #[must_use]
    pub const fn limited(max_counterparties: u32) -> Self {
        Self {
            enabled: true,
            max_counterparties,
        }
    }
}

/// An internal trader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trader {
    id: HandlerId,
    enabled: bool,
    banned: bool,
    accepts_traffic: bool,
    max_concurrent: u32,
    balances: Balances,
    filters: HandlerFilters,
    traffic_filter: TrafficFilterSettings,
    /// Commission on deals, in percent.
    commission_in_pct: Decimal,
    /// Commission on payouts, in percent.
    commission_out_pct: Decimal,
}

impl Trader {
    /// Creates an enabled trader with empty balances and no filters.
    #[must_use]
    pub fn new(id: HandlerId) -> Self {
        Self {
            id,
            enabled: true,
            banned: false,
            accepts_traffic: true,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            balances: Balances::default(),
            filters: HandlerFilters::default(),
            traffic_filter: TrafficFilterSettings::default(),
            commission_in_pct: Decimal::ZERO,
            commission_out_pct: Decimal::ZERO,
        }
    }

    /// Reconstructs a trader from storage.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: HandlerId,
        enabled: bool,
        banned: bool,
        accepts_traffic: bool,
        max_concurrent: u32,
        balances: Balances,
        filters: HandlerFilters,
        traffic_filter: TrafficFilterSettings,
        commission_in_pct: Decimal,
        commission_out_pct: Decimal,
    ) -> Self {
        Self {
            id,
            enabled,
            banned,
            accepts_traffic,
            max_concurrent,
            balances,
            filters,
            traffic_filter,
            commission_in_pct,
            commission_out_pct,
        }
    }

    /// Sets the available balance of one pair.
    #[must_use]
    pub fn with_balance(mut self, currency: BalanceCurrency, available: Decimal) -> Self {
        self.balances.pair_mut(currency).available = available;
        self
    }

    /// Sets the filters.
    #[must_use]
    pub fn with_filters(mut self, filters: HandlerFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the counterparty quota.
    #[must_use]
    pub fn with_traffic_filter(mut self, traffic_filter: TrafficFilterSettings) -> Self {
        self.traffic_filter = traffic_filter;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: u32) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Sets the commission for a direction, in percent.
    #[must_use]
    pub fn with_commission(mut self, direction: Direction, pct: Decimal) -> Self {
        match direction {
            Direction::In => self.commission_in_pct = pct,
            Direction::Out => self.commission_out_pct = pct,
        }
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the banned flag.
    #[must_use]
    pub fn with_banned(mut self, banned: bool) -> Self {
        self.banned = banned;
        self
    }

    /// Sets whether the trader takes new traffic.
    #[must_use]
    pub fn with_accepts_traffic(mut self, accepts_traffic: bool) -> Self {
        self.accepts_traffic = accepts_traffic;
        self
    }

    /// Returns the trader ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    /// Returns the enabled flag.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the banned flag.
    #[inline]
    #[must_use]
    pub fn is_banned(&self) -> bool {
        self.banned
    }

    /// Returns whether the trader takes new traffic.
    #[inline]
    #[must_use]
    pub fn accepts_traffic(&self) -> bool {
        self.accepts_traffic
    }

    /// Returns the concurrency limit.
    #[inline]
    #[must_use]
    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent
    }

    /// Returns the filters.
    #[inline]
    #[must_use]
    pub fn filters(&self) -> &HandlerFilters {
        &self.filters
    }

    /// Returns the counterparty quota.
    #[inline]
    #[must_use]
    pub fn traffic_filter(&self) -> TrafficFilterSettings {
        self.traffic_filter
    }

    /// Returns the commission for a direction, in percent.
    #[must_use]
    pub fn commission_pct(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::In => self.commission_in_pct,
            Direction::Out => self.commission_out_pct,
        }
    }
}

/// An external aggregator partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorPartner {
    id: HandlerId,
    name: String,
    active: bool,
    max_concurrent: u32,
    balances: Balances,
    /// Lower is tried first.
    priority: u32,
    base_url: String,
    api_token: String,
    timeout_ms: u64,
    sla_ms: u64,
    /// Minimum settlement balance to stay routable.
    min_balance: Decimal,
    /// Daily operation-currency volume cap.
    daily_volume_cap: Option<Decimal>,
    daily_volume_used: Decimal,
    /// UTC day `daily_volume_used` counts.
    #[serde(default)]
    volume_date: Option<NaiveDate>,
}

impl AggregatorPartner {
    /// Creates an active partner with default timeouts.
    #[must_use]
    pub fn new(id: HandlerId, base_url: impl Into<String>, priority: u32) -> Self {
        Self {
            name: id.to_string(),
            id,
            active: true,
            max_concurrent: u32::MAX,
            balances: Balances::default(),
            priority,
            base_url: base_url.into(),
            api_token: String::new(),
            timeout_ms: DEFAULT_PARTNER_TIMEOUT_MS,
            sla_ms: DEFAULT_PARTNER_SLA_MS,
            min_balance: Decimal::ZERO,
            daily_volume_cap: None,
            daily_volume_used: Decimal::ZERO,
            volume_date: None,
        }
    }

    /// Reconstructs a partner from storage.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: HandlerId,
        name: String,
        active: bool,
        max_concurrent: u32,
        balances: Balances,
        priority: u32,
        base_url: String,
        api_token: String,
        timeout_ms: u64,
        sla_ms: u64,
        min_balance: Decimal,
        daily_volume_cap: Option<Decimal>,
        daily_volume_used: Decimal,
        volume_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            name,
            active,
            max_concurrent,
            balances,
            priority,
            base_url,
            api_token,
            timeout_ms,
            sla_ms,
            min_balance,
            daily_volume_cap,
            daily_volume_used,
            volume_date,
        }
    }

    /// Sets the display name used in signed callbacks.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the API token.
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = token.into();
        self
    }

    /// Sets the call timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the SLA threshold.
    #[must_use]
    pub fn with_sla_ms(mut self, sla_ms: u64) -> Self {
        self.sla_ms = sla_ms;
        self
    }

    /// Sets the settlement available balance.
    #[must_use]
    pub fn with_settlement_balance(mut self, available: Decimal) -> Self {
        self.balances.settlement.available = available;
        self
    }

    /// Sets the minimum settlement balance.
    #[must_use]
    pub fn with_min_balance(mut self, min_balance: Decimal) -> Self {
        self.min_balance = min_balance;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: u32) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Sets the daily volume cap.
    #[must_use]
    pub fn with_daily_volume_cap(mut self, cap: Decimal) -> Self {
        self.daily_volume_cap = Some(cap);
        self
    }

    /// Sets the active flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Returns the partner ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    /// Returns the display name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the active flag.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the priority (lower is tried first).
    #[inline]
    #[must_use]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Returns the base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the API token.
    #[inline]
    #[must_use]
    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /// Returns the call timeout.
    #[inline]
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Returns the SLA threshold.
    #[inline]
    #[must_use]
    pub fn sla_ms(&self) -> u64 {
        self.sla_ms
    }

    /// Returns the minimum settlement balance.
    #[inline]
    #[must_use]
    pub fn min_balance(&self) -> Decimal {
        self.min_balance
    }

    /// Returns the daily volume cap.
    #[inline]
    #[must_use]
    pub fn daily_volume_cap(&self) -> Option<Decimal> {
        self.daily_volume_cap
    }

    /// Returns the volume routed today.
    #[inline]
    #[must_use]
    pub fn daily_volume_used(&self) -> Decimal {
        self.daily_volume_used
    }

    /// Returns the concurrency limit.
    #[inline]
    #[must_use]
    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent
    }

    /// Returns the day the stored usage belongs to.
    #[inline]
    #[must_use]
    pub fn volume_date(&self) -> Option<NaiveDate> {
        self.volume_date
    }

    /// Returns the usage counted against `day`. Usage from an earlier day
    /// counts as zero.
    #[must_use]
    pub fn volume_used_on(&self, day: NaiveDate) -> Decimal {
        if self.volume_date == Some(day) {
            self.daily_volume_used
        } else {
            Decimal::ZERO
        }
    }

    /// Returns true if the partner can take an operation of `amount` now.
    #[must_use]
    pub fn is_available_for(&self, amount: Decimal) -> bool {
        self.is_available_at(amount, Timestamp::now())
    }

    /// Returns true if the partner can take an operation of `amount` at
    /// `now`: active, above its minimum balance and within that day's cap.
    #[must_use]
    pub fn is_available_at(&self, amount: Decimal, now: Timestamp) -> bool {
        if !self.active || self.balances.settlement.available < self.min_balance {
            return false;
        }
        match self.daily_volume_cap {
            Some(cap) => self
                .volume_used_on(now.date())
                .safe_add(amount)
                .is_ok_and(|total| total <= cap),
            None => true,
        }
    }

    /// Adds routed volume to the usage of the day `at` falls on, starting
    /// from zero on a new day.
    pub fn record_volume_at(&mut self, amount: Decimal, at: Timestamp) {
        let day = at.date();
        self.daily_volume_used = self
            .volume_used_on(day)
            .safe_add(amount)
            .unwrap_or(Decimal::MAX);
        self.volume_date = Some(day);
    }

    /// Overwrites the stored usage, as loaded from storage.
    pub fn set_daily_volume(&mut self, used: Decimal, day: Option<NaiveDate>) {
        self.daily_volume_used = used;
        self.volume_date = day;
    }

    /// Overwrites the priority.
    pub fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }
}

/// Kind of handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlerKind {
    /// Internal trader.
    Internal,
    /// External aggregator partner.
    Partner,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "INTERNAL"),
            Self::Partner => write!(f, "PARTNER"),
        }
    }
}

/// A party able to fulfil operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Handler {
    /// Internal trader.
    Internal(Trader),
    /// External aggregator partner.
    Partner(AggregatorPartner),
}

/// Eligibility-relevant view shared by both handler kinds.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityProfile<'a> {
    /// Handler ID.
    pub id: &'a HandlerId,
    /// Handler kind.
    pub kind: HandlerKind,
    /// Enabled (traders) or active (partners).
    pub enabled: bool,
    /// Banned by operations staff.
    pub banned: bool,
    /// Takes new traffic.
    pub accepts_traffic: bool,
    /// Concurrency limit.
    pub max_concurrent: u32,
    /// Current balances.
    pub balances: &'a Balances,
    /// Per-operation filters.
    pub filters: &'a HandlerFilters,
    /// Counterparty quota.
    pub traffic_filter: TrafficFilterSettings,
}

static NO_FILTERS: HandlerFilters = HandlerFilters {
    max_amount: None,
    categories: BTreeSet::new(),
    traffic_tiers: BTreeSet::new(),
};

impl Handler {
    /// Returns the handler ID.
    #[must_use]
    pub fn id(&self) -> &HandlerId {
        match self {
            Self::Internal(t) => &t.id,
            Self::Partner(p) => &p.id,
        }
    }

    /// Returns the handler kind.
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Internal(_) => HandlerKind::Internal,
            Self::Partner(_) => HandlerKind::Partner,
        }
    }

    /// Returns the balances.
    #[must_use]
    pub fn balances(&self) -> &Balances {
        match self {
            Self::Internal(t) => &t.balances,
            Self::Partner(p) => &p.balances,
        }
    }

    /// Replaces the balances. Only the ledger should call this.
    pub fn set_balances(&mut self, balances: Balances) {
        match self {
            Self::Internal(t) => t.balances = balances,
            Self::Partner(p) => p.balances = balances,
        }
    }

    /// Returns the commission for a direction, in percent. Partners carry none.
    #[must_use]
    pub fn commission_pct(&self, direction: Direction) -> Decimal {
        match self {
            Self::Internal(t) => t.commission_pct(direction),
            Self::Partner(_) => Decimal::ZERO,
        }
    }

    /// Returns the balance pair this handler reserves for `direction`.
    /// Partners hold settlement funds only.
    #[must_use]
    pub fn reserved_currency(&self, direction: Direction) -> BalanceCurrency {
        match self {
            Self::Internal(_) => BalanceCurrency::reserved_for(direction),
            Self::Partner(_) => BalanceCurrency::Settlement,
        }
    }

    /// Returns the partner, if this is one.
    #[must_use]
    pub fn as_partner(&self) -> Option<&AggregatorPartner> {
        match self {
            Self::Partner(p) => Some(p),
            Self::Internal(_) => None,
        }
    }

    /// Returns the partner mutably, if this is one.
    pub fn as_partner_mut(&mut self) -> Option<&mut AggregatorPartner> {
        match self {
            Self::Partner(p) => Some(p),
            Self::Internal(_) => None,
        }
    }

    /// Returns the trader, if this is one.
    #[must_use]
    pub fn as_trader(&self) -> Option<&Trader> {
        match self {
            Self::Internal(t) => Some(t),
            Self::Partner(_) => None,
        }
    }

    /// Returns true for aggregator partners.
    #[must_use]
    pub fn is_partner(&self) -> bool {
        matches!(self, Self::Partner(_))
    }

    /// Returns the eligibility projection.
    #[must_use]
    pub fn profile(&self) -> EligibilityProfile<'_> {
        match self {
            Self::Internal(t) => EligibilityProfile {
                id: &t.id,
                kind: HandlerKind::Internal,
                enabled: t.enabled,
                banned: t.banned,
                accepts_traffic: t.accepts_traffic,
                max_concurrent: t.max_concurrent,
                balances: &t.balances,
                filters: &t.filters,
                traffic_filter: t.traffic_filter,
            },
            Self::Partner(p) => EligibilityProfile {
                id: &p.id,
                kind: HandlerKind::Partner,
                enabled: p.active,
                banned: false,
                accepts_traffic: p.active,
                max_concurrent: p.max_concurrent,
                balances: &p.balances,
                filters: &NO_FILTERS,
                traffic_filter: TrafficFilterSettings::default(),
            },
        }
    }
}

impl From<Trader> for Handler {
    fn from(trader: Trader) -> Self {
        Self::Internal(trader)
    }
}

impl From<AggregatorPartner> for Handler {
    fn from(partner: AggregatorPartner) -> Self {
        Self::Partner(partner)
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({} {})", self.kind(), self.id())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    mod filters {
        use super::*;

        #[test]
        fn default_filters_accept_every_tier() {
            let filters = HandlerFilters::default();
            assert!(filters.is_default());
            for tier in TrafficTier::all() {
                assert!(filters.accepts_tier(tier));
            }
        }

        #[test]
        fn any_configured_filter_restricts_tiers() {
            let filters = HandlerFilters::default().with_max_amount(dec(1000));
            for tier in TrafficTier::all() {
                assert!(!filters.accepts_tier(tier));
            }
            let filters = filters.with_tier(TrafficTier::Returning);
            assert!(filters.accepts_tier(TrafficTier::Returning));
            assert!(!filters.accepts_tier(TrafficTier::New));
        }

        #[test]
        fn category_and_amount() {
            let filters = HandlerFilters::default()
                .with_max_amount(dec(500))
                .with_category("card");
            assert!(filters.accepts_amount(dec(500)));
            assert!(!filters.accepts_amount(dec(501)));
            assert!(filters.accepts_category(Some("card")));
            assert!(!filters.accepts_category(Some("sbp")));
            assert!(!filters.accepts_category(None));
            assert!(HandlerFilters::default().accepts_category(None));
        }
    }

    mod partner {
        use super::*;

        #[test]
        fn availability_checks_balance_and_cap() {
            let partner = AggregatorPartner::new(HandlerId::new("p"), "http://p", 0)
                .with_settlement_balance(dec(100))
                .with_min_balance(dec(50))
                .with_daily_volume_cap(dec(1000));
            assert!(partner.is_available_for(dec(1000)));
            assert!(!partner.is_available_for(dec(1001)));

            let mut used = partner.clone();
            used.record_volume_at(dec(900), Timestamp::now());
            assert!(!used.is_available_for(dec(200)));
            used.set_daily_volume(Decimal::ZERO, None);
            assert!(used.is_available_for(dec(200)));

            let poor = partner.clone().with_settlement_balance(dec(10));
            assert!(!poor.is_available_for(dec(1)));
            let inactive = partner.with_active(false);
            assert!(!inactive.is_available_for(dec(1)));
        }

        #[test]
        fn daily_cap_resets_on_the_next_day() {
            let mut partner = AggregatorPartner::new(HandlerId::new("p"), "http://p", 0)
                .with_daily_volume_cap(dec(150));
            let first_day = Timestamp::from_secs(1_700_000_000).unwrap();
            let next_day = first_day.add_secs(86_400);

            partner.record_volume_at(dec(100), first_day);
            assert!(!partner.is_available_at(dec(100), first_day));
            assert!(partner.is_available_at(dec(100), next_day));
            assert_eq!(partner.volume_used_on(next_day.date()), Decimal::ZERO);

            partner.record_volume_at(dec(100), next_day);
            assert_eq!(partner.daily_volume_used(), dec(100));
            assert_eq!(partner.volume_date(), Some(next_day.date()));
            assert!(!partner.is_available_at(dec(60), next_day));
        }

        #[test]
        fn profile_has_no_filters_or_commission() {
            let handler = Handler::from(AggregatorPartner::new(HandlerId::new("p"), "u", 1));
            let profile = handler.profile();
            assert_eq!(profile.kind, HandlerKind::Partner);
            assert!(profile.filters.is_default());
            assert!(!profile.traffic_filter.enabled);
            assert_eq!(handler.commission_pct(Direction::In), Decimal::ZERO);
        }
    }

    mod balances {
        use super::*;

        #[test]
        fn pair_selection() {
            let trader = Trader::new(HandlerId::new("t"))
                .with_balance(BalanceCurrency::Operation, dec(5))
                .with_balance(BalanceCurrency::Settlement, dec(7));
            let mut handler = Handler::from(trader);
            assert_eq!(
                handler.balances().pair(BalanceCurrency::Operation).available,
                dec(5)
            );
            let mut balances = *handler.balances();
            balances.pair_mut(BalanceCurrency::Settlement).frozen = dec(2);
            handler.set_balances(balances);
            assert_eq!(handler.balances().settlement.total(), dec(9));
        }

        #[test]
        fn serde_is_tagged() {
            let handler = Handler::from(Trader::new(HandlerId::new("t")));
            let json = serde_json::to_value(&handler).unwrap();
            assert_eq!(json["kind"], "internal");
        }
    }
}
