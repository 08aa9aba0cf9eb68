//! # Candidate Pool
//!
//! Tick-local round-robin queue of internal handlers.
//!
//! The pool is built once per tick from a snapshot of the traders and their
//! persisted last-assignment times. Handlers never assigned come first (by
//! ID), then the least recently assigned. A handler that takes an operation
//! moves to the back and its debit is tracked as pending, so later
//! evaluations in the same tick see the reduced balance without reloading.

use crate::domain::entities::{FreezeRecord, Handler};
use crate::domain::value_objects::{BalanceCurrency, HandlerId, Timestamp};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// Round-robin queue with in-tick pending debits.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    queue: VecDeque<Handler>,
    pending: HashMap<(HandlerId, BalanceCurrency), Decimal>,
}

impl CandidatePool {
    /// Builds the queue from a handler snapshot.
    #[must_use]
    pub fn new(handlers: Vec<Handler>, last_assigned: &HashMap<HandlerId, Timestamp>) -> Self {
        let mut handlers = handlers;
        handlers.sort_by(|a, b| {
            let ka = last_assigned.get(a.id());
            let kb = last_assigned.get(b.id());
            ka.cmp(&kb).then_with(|| a.id().cmp(b.id()))
        });
        Self {
            queue: handlers.into(),
            pending: HashMap::new(),
        }
    }

    /// Number of handlers in the pool.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if the pool has no handlers.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Handlers in current queue order.
    pub fn iter(&self) -> impl Iterator<Item = &Handler> {
        self.queue.iter()
    }

    /// Current queue order as IDs.
    #[must_use]
    pub fn order(&self) -> Vec<HandlerId> {
        self.queue.iter().map(|h| h.id().clone()).collect()
    }

    /// Amount debited from `handler_id` in `currency` during this tick.
    #[must_use]
    pub fn pending(&self, handler_id: &HandlerId, currency: BalanceCurrency) -> Decimal {
        self.pending
            .get(&(handler_id.clone(), currency))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Records a committed freeze and rotates its handler to the back.
    pub fn record_assignment(&mut self, freeze: &FreezeRecord) {
        let key = (freeze.handler_id().clone(), freeze.currency());
        let entry = self.pending.entry(key).or_insert(Decimal::ZERO);
        *entry = entry.saturating_add(freeze.debited_amount());

        if let Some(pos) = self.queue.iter().position(|h| h.id() == freeze.handler_id()) {
            if let Some(handler) = self.queue.remove(pos) {
                self.queue.push_back(handler);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::entities::{FreezeTerms, Trader};
    use crate::domain::value_objects::{Direction, OperationId};

    fn trader(id: &str) -> Handler {
        Handler::from(Trader::new(HandlerId::new(id)))
    }

    fn freeze(handler: &str) -> FreezeRecord {
        let terms = FreezeTerms::compute(
            Direction::In,
            Decimal::new(1_000, 0),
            Decimal::new(100, 0),
            Decimal::ZERO,
        )
        .unwrap();
        FreezeRecord::new(OperationId::new_v4(), HandlerId::new(handler), terms)
    }

    fn ids(pool: &CandidatePool) -> Vec<String> {
        pool.order().iter().map(|id| id.as_str().to_string()).collect()
    }

    #[test]
    fn never_assigned_first_then_oldest() {
        let now = Timestamp::now();
        let last: HashMap<_, _> = [
            (HandlerId::new("a"), now),
            (HandlerId::new("b"), now.sub_secs(60)),
        ]
        .into_iter()
        .collect();
        let pool = CandidatePool::new(vec![trader("a"), trader("b"), trader("d"), trader("c")], &last);
        assert_eq!(ids(&pool), vec!["c", "d", "b", "a"]);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn assignment_rotates_and_accumulates() {
        let mut pool = CandidatePool::new(vec![trader("a"), trader("b"), trader("c")], &HashMap::new());
        pool.record_assignment(&freeze("a"));
        assert_eq!(ids(&pool), vec!["b", "c", "a"]);
        pool.record_assignment(&freeze("a"));
        assert_eq!(
            pool.pending(&HandlerId::new("a"), BalanceCurrency::Settlement),
            Decimal::new(20, 0)
        );
        assert_eq!(
            pool.pending(&HandlerId::new("a"), BalanceCurrency::Operation),
            Decimal::ZERO
        );
        assert_eq!(pool.pending(&HandlerId::new("b"), BalanceCurrency::Settlement), Decimal::ZERO);
    }

    #[test]
    fn unknown_handler_only_tracks_pending() {
        let mut pool = CandidatePool::new(vec![trader("a")], &HashMap::new());
        pool.record_assignment(&freeze("zz"));
        assert_eq!(ids(&pool), vec!["a"]);
        assert!(!pool.is_empty());
    }
}
