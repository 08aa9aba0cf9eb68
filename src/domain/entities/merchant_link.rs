//! # Merchant Link
//!
//! Relationship between a merchant and a handler allowed to serve it.

use crate::domain::value_objects::{Direction, HandlerId, MerchantId};
use serde::{Deserialize, Serialize};

/// Merchant-handler relationship with per-direction switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantLink {
    /// Merchant side.
    pub merchant_id: MerchantId,
    /// Handler side.
    pub handler_id: HandlerId,
    /// Master switch.
    pub enabled: bool,
    /// Deals (IN) allowed.
    pub deals_enabled: bool,
    /// Payouts (OUT) allowed.
    pub payouts_enabled: bool,
}

impl MerchantLink {
    /// Creates a link with everything enabled.
    #[must_use]
    pub fn new(merchant_id: MerchantId, handler_id: HandlerId) -> Self {
        Self {
            merchant_id,
            handler_id,
            enabled: true,
            deals_enabled: true,
            payouts_enabled: true,
        }
    }

    /// Returns true if the link lets `direction` through.
    #[must_use]
    pub fn allows(&self, direction: Direction) -> bool {
        self.enabled
            && match direction {
                Direction::In => self.deals_enabled,
                Direction::Out => self.payouts_enabled,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_switches() {
        let mut link = MerchantLink::new(MerchantId::new("m"), HandlerId::new("h"));
        assert!(link.allows(Direction::In));
        link.payouts_enabled = false;
        assert!(link.allows(Direction::In));
        assert!(!link.allows(Direction::Out));
        link.enabled = false;
        assert!(!link.allows(Direction::In));
    }
}
