//! # Eligibility Filter
//!
//! Evaluates the admission chain for one operation and one handler.
//!
//! Rules run in a fixed order and the first failure decides the verdict.
//! Store facts (active count, merchant link, counterparty history, traffic
//! tier) are fetched only once the cheaper rules before them have passed.
//! Nothing is written.

use crate::application::services::traffic_classifier::TrafficClassifier;
use crate::domain::entities::{FreezeTerms, Handler, Operation};
use crate::domain::services::eligibility::{
    RejectReason, RuleResult, Verdict, check_balance, check_concurrency, check_counterparty_quota,
    check_history, check_merchant_link, check_operation_filters, check_status, check_tier,
};
use crate::domain::value_objects::TrafficTier;
use crate::infrastructure::persistence::{
    MerchantLinkRepository, OperationHistory, OperationRepository, RepositoryResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Per-operation facts shared across candidate evaluations.
///
/// The traffic tier depends only on the operation, so one tick computes it
/// at most once per operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationFacts {
    tier: Option<TrafficTier>,
}

impl OperationFacts {
    /// Returns the tier if it was computed.
    #[must_use]
    pub fn tier(&self) -> Option<TrafficTier> {
        self.tier
    }
}

/// Async admission chain over the persistence ports.
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    operations: Arc<dyn OperationRepository>,
    links: Arc<dyn MerchantLinkRepository>,
    history: Arc<dyn OperationHistory>,
    classifier: TrafficClassifier,
}

impl EligibilityFilter {
    /// Creates a filter.
    #[must_use]
    pub fn new(
        operations: Arc<dyn OperationRepository>,
        links: Arc<dyn MerchantLinkRepository>,
        history: Arc<dyn OperationHistory>,
        classifier: TrafficClassifier,
    ) -> Self {
        Self {
            operations,
            links,
            history,
            classifier,
        }
    }

    /// Returns true if `handler` may take `operation` right now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a fact cannot be loaded.
    pub async fn is_eligible(
        &self,
        operation: &Operation,
        handler: &Handler,
    ) -> RepositoryResult<bool> {
        let verdict = self
            .evaluate(operation, handler, Decimal::ZERO, &mut OperationFacts::default())
            .await?;
        Ok(verdict.is_eligible())
    }

    /// Runs the chain with `pending` in-flight commitments on top of the
    /// handler's balance snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a fact cannot be loaded.
    pub async fn evaluate(
        &self,
        operation: &Operation,
        handler: &Handler,
        pending: Decimal,
        facts: &mut OperationFacts,
    ) -> RepositoryResult<Verdict> {
        let verdict = match self.run_chain(operation, handler, pending, facts).await? {
            Ok(()) => Verdict::Eligible,
            Err(reason) => {
                tracing::debug!(
                    operation_id = %operation.id(),
                    handler_id = %handler.id(),
                    reason = %reason,
                    "Handler rejected"
                );
                Verdict::Rejected(reason)
            }
        };
        Ok(verdict)
    }

    async fn run_chain(
        &self,
        operation: &Operation,
        handler: &Handler,
        pending: Decimal,
        facts: &mut OperationFacts,
    ) -> RepositoryResult<RuleResult> {
        let profile = handler.profile();

        if let Err(reason) = check_status(&profile).and_then(|()| check_history(operation, &profile))
        {
            return Ok(Err(reason));
        }

        let active = self.operations.count_active_for(profile.id).await?;
        if let Err(reason) = check_concurrency(active, &profile) {
            return Ok(Err(reason));
        }

        let Ok(terms) = FreezeTerms::compute_for(
            handler,
            operation.direction(),
            operation.amount(),
            operation.rate(),
        ) else {
            return Ok(Err(RejectReason::InsufficientBalance));
        };
        let available = profile.balances.pair(terms.currency()).available;
        if let Err(reason) = check_balance(available, terms.debited_amount(), pending) {
            return Ok(Err(reason));
        }

        let link = self.links.get(operation.merchant_id(), profile.id).await?;
        if let Err(reason) = check_merchant_link(operation, link.as_ref())
            .and_then(|()| check_operation_filters(operation, &profile))
        {
            return Ok(Err(reason));
        }

        if profile.traffic_filter.enabled {
            let Some(counterparty_id) = operation.counterparty_id() else {
                return Ok(Err(RejectReason::CounterpartyRequired));
            };
            let has_served = self.history.has_served(profile.id, counterparty_id).await?;
            let distinct = if has_served {
                0
            } else {
                self.history.distinct_counterparties(profile.id).await?
            };
            if let Err(reason) = check_counterparty_quota(&profile, has_served, distinct) {
                return Ok(Err(reason));
            }
        }

        if profile.filters.is_default() {
            return Ok(Ok(()));
        }
        let tier = match facts.tier {
            Some(tier) => tier,
            None => {
                let tier = self
                    .classifier
                    .classify(
                        operation.merchant_id(),
                        operation.counterparty_id(),
                        operation.direction(),
                    )
                    .await?;
                facts.tier = Some(tier);
                tier
            }
        };
        Ok(check_tier(&profile, tier))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        HandlerFilters, MerchantLink, OperationBuilder, TrafficFilterSettings, Trader,
    };
    use crate::domain::value_objects::{
        BalanceCurrency, CounterpartyId, Direction, HandlerId, MerchantId, Timestamp,
    };
    use crate::infrastructure::persistence::{HandlerRepository, InMemoryStore};

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn trader(id: &str) -> Trader {
        Trader::new(HandlerId::new(id)).with_balance(BalanceCurrency::Settlement, dec(1_000))
    }

    fn deal(amount: i64) -> OperationBuilder {
        OperationBuilder::new(
            MerchantId::new("m"),
            Direction::In,
            dec(amount),
            dec(10),
            Timestamp::now().add_secs(600),
        )
    }

    async fn filter_with(handlers: &[&Trader]) -> (InMemoryStore, EligibilityFilter) {
        let store = InMemoryStore::new();
        for t in handlers {
            let handler = Handler::from((*t).clone());
            HandlerRepository::save(&store, &handler).await.unwrap();
            MerchantLinkRepository::save(
                &store,
                &MerchantLink::new(MerchantId::new("m"), t.id().clone()),
            )
            .await
            .unwrap();
        }
        let shared = Arc::new(store.clone());
        let filter = EligibilityFilter::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            TrafficClassifier::new(shared),
        );
        (store, filter)
    }

    async fn verdict(filter: &EligibilityFilter, op: &Operation, t: &Trader, pending: i64) -> Verdict {
        filter
            .evaluate(op, &Handler::from(t.clone()), dec(pending), &mut OperationFacts::default())
            .await
            .unwrap()
    }

    mod chain {
        use super::*;

        #[tokio::test]
        async fn plain_trader_is_eligible() {
            let t = trader("t");
            let (_, filter) = filter_with(&[&t]).await;
            let op = deal(100).build().unwrap();
            assert!(filter.is_eligible(&op, &Handler::from(t)).await.unwrap());
        }

        #[tokio::test]
        async fn disabled_trader_is_rejected_first() {
            let t = trader("t").with_enabled(false).with_max_concurrent(0);
            let (_, filter) = filter_with(&[&t]).await;
            let op = deal(100).build().unwrap();
            assert_eq!(
                verdict(&filter, &op, &t, 0).await.reason(),
                Some(RejectReason::HandlerDisabled)
            );
        }

        #[tokio::test]
        async fn pending_commitments_count_against_balance() {
            let t = trader("t");
            let (_, filter) = filter_with(&[&t]).await;
            let op = deal(5_000).build().unwrap();
            assert!(verdict(&filter, &op, &t, 500).await.is_eligible());
            assert_eq!(
                verdict(&filter, &op, &t, 501).await.reason(),
                Some(RejectReason::InsufficientBalance)
            );
        }

        #[tokio::test]
        async fn missing_link_is_rejected() {
            let t = trader("t");
            let (_, filter) = filter_with(&[]).await;
            let op = deal(100).build().unwrap();
            assert_eq!(
                verdict(&filter, &op, &t, 0).await.reason(),
                Some(RejectReason::MerchantLinkDisabled)
            );
        }

        #[tokio::test]
        async fn concurrency_limit_applies() {
            let t = trader("t").with_max_concurrent(0);
            let (_, filter) = filter_with(&[&t]).await;
            let op = deal(100).build().unwrap();
            assert_eq!(
                verdict(&filter, &op, &t, 0).await.reason(),
                Some(RejectReason::ConcurrencyLimit)
            );
        }
    }

    mod traffic {
        use super::*;

        #[tokio::test]
        async fn filtering_requires_counterparty() {
            let t = trader("t").with_traffic_filter(TrafficFilterSettings::limited(5));
            let (_, filter) = filter_with(&[&t]).await;
            let op = deal(100).build().unwrap();
            assert_eq!(
                verdict(&filter, &op, &t, 0).await.reason(),
                Some(RejectReason::CounterpartyRequired)
            );
        }

        #[tokio::test]
        async fn exhausted_quota_rejects_new_counterparty() {
            let t = trader("t").with_traffic_filter(TrafficFilterSettings::limited(0));
            let (_, filter) = filter_with(&[&t]).await;
            let op = deal(100)
                .counterparty(CounterpartyId::new("c"))
                .build()
                .unwrap();
            assert_eq!(
                verdict(&filter, &op, &t, 0).await.reason(),
                Some(RejectReason::CounterpartyQuotaExhausted)
            );
        }

        #[tokio::test]
        async fn default_filters_accept_every_tier() {
            let t = trader("t");
            let (_, filter) = filter_with(&[&t]).await;
            let op = deal(100)
                .counterparty(CounterpartyId::new("c"))
                .build()
                .unwrap();
            let mut facts = OperationFacts::default();
            let v = filter
                .evaluate(&op, &Handler::from(t), Decimal::ZERO, &mut facts)
                .await
                .unwrap();
            assert!(v.is_eligible());
            assert_eq!(facts.tier(), None);
        }

        #[tokio::test]
        async fn configured_filters_reject_unlisted_tier() {
            let t = trader("t").with_filters(HandlerFilters::default().with_tier(TrafficTier::HighVolume));
            let (_, filter) = filter_with(&[&t]).await;
            let op = deal(100)
                .counterparty(CounterpartyId::new("c"))
                .build()
                .unwrap();
            let mut facts = OperationFacts::default();
            let v = filter
                .evaluate(&op, &Handler::from(t), Decimal::ZERO, &mut facts)
                .await
                .unwrap();
            assert_eq!(v.reason(), Some(RejectReason::TierNotAccepted));
            assert_eq!(facts.tier(), Some(TrafficTier::New));
        }

        #[tokio::test]
        async fn listed_tier_is_accepted() {
            let t = trader("t").with_filters(HandlerFilters::default().with_tier(TrafficTier::New));
            let (_, filter) = filter_with(&[&t]).await;
            let op = deal(100).build().unwrap();
            assert!(verdict(&filter, &op, &t, 0).await.is_eligible());
        }
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let t = trader("t");
        let (store, filter) = filter_with(&[&t]).await;
        store.set_unavailable(true);
        let op = deal(100).build().unwrap();
        let err = filter.is_eligible(&op, &Handler::from(t)).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
