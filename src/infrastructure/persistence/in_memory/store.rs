//! # In-Memory Store
//!
//! One shared in-memory state implementing every persistence port, for tests
//! and single-process deployments.
//!
//! Ledger transactions take a per-handler [`tokio::sync::Mutex`] standing in
//! for the row lock, buffer their writes, and apply them atomically at commit
//! after re-checking every written operation's version. Dropping a
//! transaction discards the buffer.
//!
//! The round-robin queue lives in process memory, so fairness positions reset
//! on restart.
//!
//! # Examples
//!
//! ```
//! use deal_router::infrastructure::persistence::in_memory::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! assert_eq!(store.operation_count(), 0);
//! ```

use crate::domain::entities::{
    AggregatorPartner, Balances, FreezeRecord, Handler, MerchantLink, Operation,
};
use crate::domain::value_objects::{
    BalanceCurrency, CounterpartyId, Direction, HandlerId, MerchantId, OperationId,
    OperationStatus, Timestamp,
};
use crate::infrastructure::persistence::traits::{
    AssignmentQueue, HandlerRepository, LedgerStore, LedgerTransaction, MerchantLinkRepository,
    OperationHistory, OperationRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Default)]
struct State {
    handlers: HashMap<HandlerId, Handler>,
    operations: HashMap<OperationId, Operation>,
    freezes: HashMap<OperationId, FreezeRecord>,
    links: HashMap<(MerchantId, HandlerId), MerchantLink>,
}

impl State {
    /// Operations a handler completed or currently holds.
    fn history_of<'a>(&'a self, handler_id: &'a HandlerId) -> impl Iterator<Item = &'a Operation> {
        self.operations.values().filter(move |op| {
            op.handler_id() == Some(handler_id)
                && (op.status() == OperationStatus::Completed || op.occupies_handler())
        })
    }
}

/// In-memory implementation of all persistence ports.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    row_locks: Arc<DashMap<HandlerId, Arc<Mutex<()>>>>,
    last_assigned: Arc<parking_lot::Mutex<HashMap<HandlerId, Timestamp>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the store going down (`true`) or coming back (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of stored operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.state
            .try_read()
            .map(|guard| guard.operations.len())
            .unwrap_or(0)
    }

    /// Returns the number of live freeze records.
    pub async fn freeze_count(&self) -> usize {
        self.state.read().await.freezes.len()
    }

    /// Returns the sum of debited amounts of the live freezes `handler_id`
    /// holds in `currency`.
    pub async fn debited_total(&self, handler_id: &HandlerId, currency: BalanceCurrency) -> Decimal {
        self.state
            .read()
            .await
            .freezes
            .values()
            .filter(|f| f.handler_id() == handler_id && f.currency() == currency)
            .map(FreezeRecord::debited_amount)
            .sum()
    }

    fn check_available(&self) -> RepositoryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RepositoryError::connection("in-memory store marked unavailable"))
        } else {
            Ok(())
        }
    }

    fn row_lock(&self, handler_id: &HandlerId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.row_locks
                .entry(handler_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

#[async_trait]
impl OperationRepository for InMemoryStore {
    async fn insert(&self, operation: &Operation) -> RepositoryResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.operations.contains_key(&operation.id()) {
            return Err(RepositoryError::duplicate(
                "Operation",
                operation.id().to_string(),
            ));
        }
        state.operations.insert(operation.id(), operation.clone());
        Ok(())
    }

    async fn get(&self, id: OperationId) -> RepositoryResult<Option<Operation>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.operations.get(&id).cloned())
    }

    async fn update(&self, operation: &Operation, expected_version: u64) -> RepositoryResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let stored = state
            .operations
            .get_mut(&operation.id())
            .ok_or_else(|| RepositoryError::not_found("Operation", operation.id().to_string()))?;
        if stored.version() != expected_version {
            return Err(RepositoryError::version_conflict(
                "Operation",
                operation.id().to_string(),
                expected_version,
                stored.version(),
            ));
        }
        *stored = operation.clone();
        Ok(())
    }

    async fn find_assignable(&self, now: Timestamp) -> RepositoryResult<Vec<Operation>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut found: Vec<Operation> = state
            .operations
            .values()
            .filter(|op| op.is_assignable_at(now))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().get().cmp(&b.id().get()))
        });
        Ok(found)
    }

    async fn find_expired(&self, now: Timestamp) -> RepositoryResult<Vec<Operation>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .operations
            .values()
            .filter(|op| op.status() == OperationStatus::Created && !op.expires_at().is_after(&now))
            .cloned()
            .collect())
    }

    async fn count_active_for(&self, handler_id: &HandlerId) -> RepositoryResult<u32> {
        self.check_available()?;
        let state = self.state.read().await;
        let count = state
            .operations
            .values()
            .filter(|op| op.handler_id() == Some(handler_id) && op.occupies_handler())
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl HandlerRepository for InMemoryStore {
    async fn save(&self, handler: &Handler) -> RepositoryResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.handlers.insert(handler.id().clone(), handler.clone());
        Ok(())
    }

    async fn get(&self, id: &HandlerId) -> RepositoryResult<Option<Handler>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.handlers.get(id).cloned())
    }

    async fn find_traders(&self) -> RepositoryResult<Vec<Handler>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut traders: Vec<Handler> = state
            .handlers
            .values()
            .filter(|h| !h.is_partner())
            .cloned()
            .collect();
        traders.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(traders)
    }

    async fn find_partners(&self) -> RepositoryResult<Vec<AggregatorPartner>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut partners: Vec<AggregatorPartner> = state
            .handlers
            .values()
            .filter_map(Handler::as_partner)
            .cloned()
            .collect();
        partners.sort_by(|a, b| a.priority().cmp(&b.priority()).then_with(|| a.id().cmp(b.id())));
        Ok(partners)
    }

    async fn update_priority(&self, id: &HandlerId, priority: u32) -> RepositoryResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let partner = state
            .handlers
            .get_mut(id)
            .and_then(Handler::as_partner_mut)
            .ok_or_else(|| RepositoryError::not_found("AggregatorPartner", id.to_string()))?;
        partner.set_priority(priority);
        Ok(())
    }

    async fn add_partner_volume(
        &self,
        id: &HandlerId,
        amount: Decimal,
        at: Timestamp,
    ) -> RepositoryResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let partner = state
            .handlers
            .get_mut(id)
            .and_then(Handler::as_partner_mut)
            .ok_or_else(|| RepositoryError::not_found("AggregatorPartner", id.to_string()))?;
        partner.record_volume_at(amount, at);
        Ok(())
    }
}

#[async_trait]
impl MerchantLinkRepository for InMemoryStore {
    async fn save(&self, link: &MerchantLink) -> RepositoryResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.links.insert(
            (link.merchant_id.clone(), link.handler_id.clone()),
            link.clone(),
        );
        Ok(())
    }

    async fn get(
        &self,
        merchant_id: &MerchantId,
        handler_id: &HandlerId,
    ) -> RepositoryResult<Option<MerchantLink>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .links
            .get(&(merchant_id.clone(), handler_id.clone()))
            .cloned())
    }
}

#[async_trait]
impl OperationHistory for InMemoryStore {
    async fn count_completed(
        &self,
        merchant_id: &MerchantId,
        counterparty_id: &CounterpartyId,
        direction: Direction,
    ) -> RepositoryResult<u64> {
        self.check_available()?;
        let state = self.state.read().await;
        let count = state
            .operations
            .values()
            .filter(|op| {
                op.status() == OperationStatus::Completed
                    && op.direction() == direction
                    && op.merchant_id() == merchant_id
                    && op.counterparty_id() == Some(counterparty_id)
            })
            .count();
        Ok(count as u64)
    }

    async fn has_served(
        &self,
        handler_id: &HandlerId,
        counterparty_id: &CounterpartyId,
    ) -> RepositoryResult<bool> {
        self.check_available()?;
        let state = self.state.read().await;
        let served = state
            .history_of(handler_id)
            .any(|op| op.counterparty_id() == Some(counterparty_id));
        Ok(served)
    }

    async fn distinct_counterparties(&self, handler_id: &HandlerId) -> RepositoryResult<u64> {
        self.check_available()?;
        let state = self.state.read().await;
        let distinct: HashSet<&CounterpartyId> = state
            .history_of(handler_id)
            .filter_map(Operation::counterparty_id)
            .collect();
        Ok(distinct.len() as u64)
    }
}

#[async_trait]
impl AssignmentQueue for InMemoryStore {
    async fn last_assigned(&self) -> RepositoryResult<HashMap<HandlerId, Timestamp>> {
        self.check_available()?;
        Ok(self.last_assigned.lock().clone())
    }

    async fn record_assignment(
        &self,
        handler_id: &HandlerId,
        at: Timestamp,
    ) -> RepositoryResult<()> {
        self.check_available()?;
        self.last_assigned.lock().insert(handler_id.clone(), at);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self, handler_id: &HandlerId) -> RepositoryResult<Box<dyn LedgerTransaction>> {
        self.check_available()?;
        let guard = self.row_lock(handler_id).lock_owned().await;
        let handler = {
            let state = self.state.read().await;
            state
                .handlers
                .get(handler_id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("Handler", handler_id.to_string()))?
        };
        Ok(Box::new(InMemoryLedgerTransaction {
            state: Arc::clone(&self.state),
            _guard: guard,
            handler,
            balances: None,
            operations: HashMap::new(),
            freeze_inserts: HashMap::new(),
            freeze_deletes: HashSet::new(),
        }))
    }
}

/// Buffered transaction over one locked handler.
#[derive(Debug)]
struct InMemoryLedgerTransaction {
    state: Arc<RwLock<State>>,
    _guard: OwnedMutexGuard<()>,
    handler: Handler,
    balances: Option<Balances>,
    /// Written operations with the version they were read at.
    operations: HashMap<OperationId, (Operation, u64)>,
    freeze_inserts: HashMap<OperationId, FreezeRecord>,
    freeze_deletes: HashSet<OperationId>,
}

#[async_trait]
impl LedgerTransaction for InMemoryLedgerTransaction {
    fn handler(&self) -> &Handler {
        &self.handler
    }

    async fn save_balances(&mut self, balances: Balances) -> RepositoryResult<()> {
        self.handler.set_balances(balances);
        self.balances = Some(balances);
        Ok(())
    }

    async fn load_operation(&mut self, id: OperationId) -> RepositoryResult<Operation> {
        if let Some((operation, _)) = self.operations.get(&id) {
            return Ok(operation.clone());
        }
        let state = self.state.read().await;
        state
            .operations
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("Operation", id.to_string()))
    }

    async fn save_operation(
        &mut self,
        operation: &Operation,
        expected_version: u64,
    ) -> RepositoryResult<()> {
        let first_read = match self.operations.get(&operation.id()) {
            Some((buffered, original)) => {
                if buffered.version() != expected_version {
                    return Err(RepositoryError::version_conflict(
                        "Operation",
                        operation.id().to_string(),
                        expected_version,
                        buffered.version(),
                    ));
                }
                *original
            }
            None => expected_version,
        };
        self.operations
            .insert(operation.id(), (operation.clone(), first_read));
        Ok(())
    }

    async fn load_freeze(
        &mut self,
        operation_id: OperationId,
    ) -> RepositoryResult<Option<FreezeRecord>> {
        if let Some(record) = self.freeze_inserts.get(&operation_id) {
            return Ok(Some(record.clone()));
        }
        if self.freeze_deletes.contains(&operation_id) {
            return Ok(None);
        }
        let state = self.state.read().await;
        Ok(state.freezes.get(&operation_id).cloned())
    }

    async fn insert_freeze(&mut self, record: &FreezeRecord) -> RepositoryResult<()> {
        if self.load_freeze(record.operation_id()).await?.is_some() {
            return Err(RepositoryError::duplicate(
                "FreezeRecord",
                record.operation_id().to_string(),
            ));
        }
        self.freeze_inserts
            .insert(record.operation_id(), record.clone());
        Ok(())
    }

    async fn delete_freeze(&mut self, operation_id: OperationId) -> RepositoryResult<()> {
        self.freeze_inserts.remove(&operation_id);
        self.freeze_deletes.insert(operation_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let this = *self;
        let mut state = this.state.write().await;

        for (id, (_, expected)) in &this.operations {
            let actual = state
                .operations
                .get(id)
                .map(Operation::version)
                .ok_or_else(|| RepositoryError::not_found("Operation", id.to_string()))?;
            if actual != *expected {
                return Err(RepositoryError::version_conflict(
                    "Operation",
                    id.to_string(),
                    *expected,
                    actual,
                ));
            }
        }

        if let Some(balances) = this.balances {
            let stored = state
                .handlers
                .get_mut(this.handler.id())
                .ok_or_else(|| RepositoryError::not_found("Handler", this.handler.id().to_string()))?;
            stored.set_balances(balances);
        }
        for (id, (operation, _)) in this.operations {
            state.operations.insert(id, operation);
        }
        for id in this.freeze_deletes {
            state.freezes.remove(&id);
        }
        for (id, record) in this.freeze_inserts {
            state.freezes.insert(id, record);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::entities::{FreezeTerms, OperationBuilder, Trader};

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn op_at(created_secs_ago: i64, counterparty: Option<&str>) -> Operation {
        let now = Timestamp::now();
        let mut builder = OperationBuilder::new(
            MerchantId::new("m"),
            Direction::In,
            dec(100),
            dec(10),
            now.add_secs(600),
        )
        .created_at(now.sub_secs(created_secs_ago));
        if let Some(c) = counterparty {
            builder = builder.counterparty(CounterpartyId::new(c));
        }
        builder.build().unwrap()
    }

    async fn store_with_trader() -> (InMemoryStore, HandlerId) {
        let store = InMemoryStore::new();
        let id = HandlerId::new("t-1");
        let trader = Trader::new(id.clone()).with_balance(BalanceCurrency::Settlement, dec(100));
        HandlerRepository::save(&store, &Handler::from(trader))
            .await
            .unwrap();
        (store, id)
    }

    mod operations {
        use super::*;

        #[tokio::test]
        async fn assignable_are_oldest_first() {
            let store = InMemoryStore::new();
            let young = op_at(1, None);
            let old = op_at(50, None);
            store.insert(&young).await.unwrap();
            store.insert(&old).await.unwrap();

            let found = store.find_assignable(Timestamp::now()).await.unwrap();
            let ids: Vec<_> = found.iter().map(Operation::id).collect();
            assert_eq!(ids, vec![old.id(), young.id()]);
            assert!(matches!(
                store.insert(&old).await,
                Err(RepositoryError::Duplicate { .. })
            ));
        }

        #[tokio::test]
        async fn expired_are_not_assignable() {
            let store = InMemoryStore::new();
            let op = op_at(1, None);
            store.insert(&op).await.unwrap();
            let later = op.expires_at().add_secs(1);
            assert!(store.find_assignable(later).await.unwrap().is_empty());
            assert_eq!(store.find_expired(later).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn unavailable_store_fails_fast() {
            let store = InMemoryStore::new();
            store.set_unavailable(true);
            let err = store.find_assignable(Timestamp::now()).await.unwrap_err();
            assert!(err.is_unavailable());
        }
    }

    mod transactions {
        use super::*;

        #[tokio::test]
        async fn commit_applies_all_writes() {
            let (store, handler_id) = store_with_trader().await;
            let op = op_at(1, Some("c"));
            store.insert(&op).await.unwrap();

            let mut tx = store.begin(&handler_id).await.unwrap();
            let mut loaded = tx.load_operation(op.id()).await.unwrap();
            let expected = loaded.version();
            loaded.assign(handler_id.clone(), dec(10)).unwrap();
            tx.save_operation(&loaded, expected).await.unwrap();
            let terms = FreezeTerms::compute(Direction::In, dec(100), dec(10), Decimal::ZERO).unwrap();
            tx.insert_freeze(&FreezeRecord::new(op.id(), handler_id.clone(), terms))
                .await
                .unwrap();
            let mut balances = *tx.handler().balances();
            balances.settlement.available = dec(90);
            balances.settlement.frozen = dec(10);
            tx.save_balances(balances).await.unwrap();
            tx.commit().await.unwrap();

            let stored = OperationRepository::get(&store, op.id()).await.unwrap().unwrap();
            assert_eq!(stored.handler_id(), Some(&handler_id));
            assert_eq!(store.freeze_count().await, 1);
            let handler = HandlerRepository::get(&store, &handler_id).await.unwrap().unwrap();
            assert_eq!(handler.balances().settlement.frozen, dec(10));
            assert_eq!(store.count_active_for(&handler_id).await.unwrap(), 1);
            assert!(
                store
                    .has_served(&handler_id, &CounterpartyId::new("c"))
                    .await
                    .unwrap()
            );
        }

        #[tokio::test]
        async fn drop_rolls_back() {
            let (store, handler_id) = store_with_trader().await;
            {
                let mut tx = store.begin(&handler_id).await.unwrap();
                tx.save_balances(Balances::default()).await.unwrap();
            }
            let handler = HandlerRepository::get(&store, &handler_id).await.unwrap().unwrap();
            assert_eq!(handler.balances().settlement.available, dec(100));
        }

        #[tokio::test]
        async fn stale_version_conflicts() {
            let (store, handler_id) = store_with_trader().await;
            let op = op_at(1, None);
            store.insert(&op).await.unwrap();

            let mut tx = store.begin(&handler_id).await.unwrap();
            let mut loaded = tx.load_operation(op.id()).await.unwrap();
            loaded.assign(handler_id.clone(), dec(1)).unwrap();
            tx.save_operation(&loaded, op.version()).await.unwrap();

            // a concurrent writer bumps the stored version
            {
                let mut state = store.state.write().await;
                let mut other = op.clone();
                other.assign(HandlerId::new("other"), dec(1)).unwrap();
                state.operations.insert(op.id(), other);
            }

            let err = tx.commit().await.unwrap_err();
            assert!(matches!(err, RepositoryError::VersionConflict { .. }));
        }

        #[tokio::test]
        async fn unknown_handler_cannot_begin() {
            let store = InMemoryStore::new();
            let result = store.begin(&HandlerId::new("ghost")).await;
            assert!(matches!(result, Err(ref e) if e.is_not_found()));
        }
    }

    mod queries {
        use super::*;
        use crate::domain::entities::AggregatorPartner;

        #[tokio::test]
        async fn partners_sorted_by_priority() {
            let store = InMemoryStore::new();
            for (id, prio) in [("a", 2), ("b", 0), ("c", 1)] {
                let partner = AggregatorPartner::new(HandlerId::new(id), "http://x", prio);
                HandlerRepository::save(&store, &Handler::from(partner))
                    .await
                    .unwrap();
            }
            let ids: Vec<String> = store
                .find_partners()
                .await
                .unwrap()
                .iter()
                .map(|p| p.id().to_string())
                .collect();
            assert_eq!(ids, vec!["b", "c", "a"]);

            store.update_priority(&HandlerId::new("a"), 0).await.unwrap();
            let first = store.find_partners().await.unwrap();
            assert_eq!(first[0].id(), &HandlerId::new("a"));
        }

        #[tokio::test]
        async fn partner_volume_restarts_each_day() {
            let store = InMemoryStore::new();
            let partner = AggregatorPartner::new(HandlerId::new("p"), "http://p", 0)
                .with_daily_volume_cap(Decimal::new(150, 0));
            HandlerRepository::save(&store, &Handler::from(partner))
                .await
                .unwrap();
            let id = HandlerId::new("p");
            let day = Timestamp::from_secs(1_700_000_000).unwrap();

            store.add_partner_volume(&id, Decimal::new(100, 0), day).await.unwrap();
            store
                .add_partner_volume(&id, Decimal::new(30, 0), day.add_secs(60))
                .await
                .unwrap();
            let p = store.find_partners().await.unwrap().remove(0);
            assert_eq!(p.daily_volume_used(), Decimal::new(130, 0));
            assert!(!p.is_available_at(Decimal::new(100, 0), day));

            let next = day.add_secs(86_400);
            assert!(p.is_available_at(Decimal::new(100, 0), next));
            store.add_partner_volume(&id, Decimal::new(40, 0), next).await.unwrap();
            let p = store.find_partners().await.unwrap().remove(0);
            assert_eq!(p.daily_volume_used(), Decimal::new(40, 0));
            assert_eq!(p.volume_date(), Some(next.date()));
        }

        #[tokio::test]
        async fn assignment_queue_round_trip() {
            let store = InMemoryStore::new();
            let at = Timestamp::now();
            store
                .record_assignment(&HandlerId::new("h"), at)
                .await
                .unwrap();
            let map = store.last_assigned().await.unwrap();
            assert_eq!(map.get(&HandlerId::new("h")), Some(&at));
        }
    }
}
