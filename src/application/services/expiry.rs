//! # Expiry Sweep
//!
//! Periodic task moving overdue `Created` operations to `Expired`,
//! releasing any tentative freeze they still hold.

use crate::application::error::ApplicationResult;
use crate::application::services::operation_assigner::OperationAssigner;
use crate::application::services::scheduler::PeriodicTask;
use crate::domain::value_objects::Timestamp;
use async_trait::async_trait;

/// Expires operations past their deadline.
#[derive(Debug, Clone)]
pub struct ExpirySweep {
    assigner: OperationAssigner,
}

impl ExpirySweep {
    /// Creates a sweep.
    #[must_use]
    pub fn new(assigner: OperationAssigner) -> Self {
        Self { assigner }
    }
}

#[async_trait]
impl PeriodicTask for ExpirySweep {
    fn name(&self) -> &'static str {
        "expiry"
    }

    async fn run_once(&self) -> ApplicationResult<()> {
        let expired = self.assigner.expire_due(Timestamp::now()).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired overdue operations");
        }
        Ok(())
    }
}
