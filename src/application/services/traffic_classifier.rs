//! # Traffic Classifier
//!
//! Segments counterparties by completed history with a merchant.
//!
//! | Completed | Tier |
//! |-----------|------|
//! | 0 or no counterparty | NEW |
//! | 1-9 | RETURNING |
//! | 10+ | HIGH_VOLUME |
//!
//! Deals and payouts are counted separately: deal history never raises the
//! payout tier and vice versa.

use crate::domain::value_objects::{CounterpartyId, Direction, MerchantId, TrafficTier};
use crate::infrastructure::persistence::{OperationHistory, RepositoryResult};
use std::sync::Arc;

/// Computes traffic tiers from the operation history.
#[derive(Debug, Clone)]
pub struct TrafficClassifier {
    history: Arc<dyn OperationHistory>,
}

impl TrafficClassifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new(history: Arc<dyn OperationHistory>) -> Self {
        Self { history }
    }

    /// Classifies `counterparty_id` for `merchant_id` in `direction`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the count query fails.
    pub async fn classify(
        &self,
        merchant_id: &MerchantId,
        counterparty_id: Option<&CounterpartyId>,
        direction: Direction,
    ) -> RepositoryResult<TrafficTier> {
        let Some(counterparty_id) = counterparty_id else {
            return Ok(TrafficTier::New);
        };
        let completed = self
            .history
            .count_completed(merchant_id, counterparty_id, direction)
            .await?;
        Ok(TrafficTier::from_completed_count(completed))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::entities::{Handler, OperationBuilder, Trader};
    use crate::domain::value_objects::{BalanceCurrency, HandlerId, Timestamp};
    use crate::infrastructure::persistence::{
        HandlerRepository, InMemoryStore, LedgerStore, OperationRepository,
    };
    use rust_decimal::Decimal;

    async fn complete_operations(store: &InMemoryStore, direction: Direction, n: usize) {
        for _ in 0..n {
            let mut op = OperationBuilder::new(
                MerchantId::new("m"),
                direction,
                Decimal::ONE,
                Decimal::ONE,
                Timestamp::now().add_secs(60),
            )
            .counterparty(CounterpartyId::new("c"))
            .build()
            .unwrap();
            OperationRepository::insert(store, &op).await.unwrap();
            let version = op.version();
            op.assign(HandlerId::new("h"), Decimal::ONE).unwrap();
            op.complete().unwrap();
            let mut tx = store.begin(&HandlerId::new("h")).await.unwrap();
            tx.save_operation(&op, version).await.unwrap();
            tx.commit().await.unwrap();
        }
    }

    async fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let trader =
            Trader::new(HandlerId::new("h")).with_balance(BalanceCurrency::Settlement, Decimal::TEN);
        HandlerRepository::save(&store, &Handler::from(trader))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn anonymous_is_new() {
        let classifier = TrafficClassifier::new(Arc::new(store().await));
        let tier = classifier
            .classify(&MerchantId::new("m"), None, Direction::In)
            .await
            .unwrap();
        assert_eq!(tier, TrafficTier::New);
    }

    #[tokio::test]
    async fn tiers_follow_completed_count() {
        let store = store().await;
        let classifier = TrafficClassifier::new(Arc::new(store.clone()));
        let merchant = MerchantId::new("m");
        let cp = CounterpartyId::new("c");

        let tier = classifier.classify(&merchant, Some(&cp), Direction::In).await.unwrap();
        assert_eq!(tier, TrafficTier::New);

        complete_operations(&store, Direction::In, 1).await;
        let tier = classifier.classify(&merchant, Some(&cp), Direction::In).await.unwrap();
        assert_eq!(tier, TrafficTier::Returning);

        complete_operations(&store, Direction::In, 9).await;
        let tier = classifier.classify(&merchant, Some(&cp), Direction::In).await.unwrap();
        assert_eq!(tier, TrafficTier::HighVolume);
    }

    #[tokio::test]
    async fn directions_are_counted_separately() {
        let store = store().await;
        complete_operations(&store, Direction::In, 3).await;
        let classifier = TrafficClassifier::new(Arc::new(store));
        let tier = classifier
            .classify(
                &MerchantId::new("m"),
                Some(&CounterpartyId::new("c")),
                Direction::Out,
            )
            .await
            .unwrap();
        assert_eq!(tier, TrafficTier::New);
    }
}
