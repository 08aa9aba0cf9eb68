//! # Application Errors
//!
//! Error types for the routing and settlement services.
//!
//! # Error Hierarchy
//!
//! ```text
//! ApplicationError
//! ├── Ledger(LedgerError)       - Freeze, release and settle failures
//! ├── Routing(RoutingError)     - Assignment and fallback failures
//! ├── Callback(CallbackError)   - Rejected partner callbacks
//! ├── Domain(DomainError)       - Business rule violations
//! ├── Repository(RepositoryError)
//! ├── Performance(PartnerPerformanceError)
//! └── Configuration(String)
//! ```
//!
//! # Examples
//!
//! ```
//! use deal_router::application::error::{ApplicationError, LedgerError};
//! use rust_decimal::Decimal;
//!
//! let err = LedgerError::insufficient_balance(Decimal::new(7000, 2), Decimal::new(5000, 2));
//! let app_err: ApplicationError = err.into();
//! assert!(!app_err.is_unavailable());
//! ```

use crate::domain::errors::DomainError;
use crate::domain::services::PartnerPerformanceError;
use crate::domain::value_objects::{ArithmeticError, HandlerId, OperationId};
use crate::infrastructure::callbacks::CallbackError;
use crate::infrastructure::persistence::RepositoryError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Balance ledger failures.
///
/// Every ledger call is all-or-nothing: when one of these is returned the
/// handler balances are untouched.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Available balance does not cover the debit.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount that would be debited.
        required: Decimal,
        /// Amount currently available.
        available: Decimal,
    },

    /// A movement would leave the ledger in an impossible state.
    #[error("ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    /// No freeze record exists for the operation.
    #[error("freeze record not found for operation {0}")]
    FreezeNotFound(OperationId),

    /// Freeze record belongs to another handler.
    #[error("freeze record for operation {operation_id} is held by {holder}")]
    ForeignFreeze {
        /// Operation ID.
        operation_id: OperationId,
        /// Handler owning the freeze.
        holder: HandlerId,
    },

    /// Overflow or underflow in balance arithmetic.
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    /// Domain validation failure.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store failure.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl LedgerError {
    /// Creates an insufficient balance error.
    #[must_use]
    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    /// Creates a ledger inconsistency error.
    #[must_use]
    pub fn inconsistency(message: impl Into<String>) -> Self {
        Self::LedgerInconsistency(message.into())
    }

    /// Returns true if the store could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Repository(e) if e.is_unavailable())
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Assignment and routing failures.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Balance re-check under the handler lock failed.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount that would be debited.
        required: Decimal,
        /// Amount available at commit time.
        available: Decimal,
    },

    /// The operation changed since it was read, usually a concurrent assignment.
    #[error("operation {0} was already assigned or modified")]
    AlreadyAssigned(OperationId),

    /// Every partner declined, timed out or was unavailable.
    #[error("all partners exhausted for operation {operation_id} after {attempts} attempts")]
    AllPartnersExhausted {
        /// Operation ID.
        operation_id: OperationId,
        /// Number of partners attempted.
        attempts: usize,
    },

    /// Handler does not exist.
    #[error("handler not found: {0}")]
    HandlerNotFound(HandlerId),

    /// Operation does not exist.
    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    /// Ledger failure other than insufficient balance.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    /// Domain rule violation.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store failure.
    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl RoutingError {
    /// Returns true if the store could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Repository(e) => e.is_unavailable(),
            Self::Ledger(e) => e.is_unavailable(),
            _ => false,
        }
    }

    /// Returns true if the next tick may succeed without intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. }
                | Self::AlreadyAssigned(_)
                | Self::AllPartnersExhausted { .. }
        ) || self.is_unavailable()
    }
}

impl From<LedgerError> for RoutingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                required,
                available,
            } => Self::InsufficientBalance {
                required,
                available,
            },
            LedgerError::Domain(e) => Self::Domain(e),
            LedgerError::Repository(e) => Self::from(e),
            other => Self::Ledger(other),
        }
    }
}

impl From<RepositoryError> for RoutingError {
    fn from(err: RepositoryError) -> Self {
        Self::Repository(err)
    }
}

impl RoutingError {
    /// Maps a store error for `operation_id`, turning version conflicts into
    /// [`RoutingError::AlreadyAssigned`].
    #[must_use]
    pub fn from_store(operation_id: OperationId, err: RepositoryError) -> Self {
        match err {
            RepositoryError::VersionConflict { .. } => Self::AlreadyAssigned(operation_id),
            RepositoryError::NotFound {
                entity_type: "Operation",
                ..
            } => Self::OperationNotFound(operation_id),
            other => Self::Repository(other),
        }
    }
}

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Umbrella error for the application layer.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Routing failure.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Callback rejected.
    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// Domain rule violation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Store failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Integration log failure.
    #[error(transparent)]
    Performance(#[from] PartnerPerformanceError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true if the store could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_unavailable(),
            Self::Routing(e) => e.is_unavailable(),
            Self::Repository(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

/// Result type for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod conversions {
        use super::*;

        #[test]
        fn insufficient_balance_keeps_amounts() {
            let err: RoutingError =
                LedgerError::insufficient_balance(Decimal::new(70, 0), Decimal::new(10, 0)).into();
            assert!(matches!(
                err,
                RoutingError::InsufficientBalance { required, .. } if required == Decimal::new(70, 0)
            ));
            assert!(err.is_transient());
        }

        #[test]
        fn version_conflict_becomes_already_assigned() {
            let id = OperationId::new_v4();
            let err = RoutingError::from_store(
                id,
                RepositoryError::version_conflict("Operation", id.to_string(), 1, 2),
            );
            assert!(matches!(err, RoutingError::AlreadyAssigned(got) if got == id));
        }

        #[test]
        fn unavailability_propagates() {
            let err: RoutingError = LedgerError::Repository(RepositoryError::connection("down")).into();
            assert!(err.is_unavailable());
            let app: ApplicationError = err.into();
            assert!(app.is_unavailable());
        }
    }

    mod display {
        use super::*;

        #[test]
        fn exhausted_message() {
            let id = OperationId::new_v4();
            let err = RoutingError::AllPartnersExhausted {
                operation_id: id,
                attempts: 2,
            };
            assert_eq!(
                err.to_string(),
                format!("all partners exhausted for operation {id} after 2 attempts")
            );
        }

        #[test]
        fn inconsistency_message() {
            let err = LedgerError::inconsistency("frozen would go negative");
            assert_eq!(
                err.to_string(),
                "ledger inconsistency: frozen would go negative"
            );
        }
    }
}
