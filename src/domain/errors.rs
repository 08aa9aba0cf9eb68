//! # Domain Errors
//!
//! Business rule violations raised by entities and pure domain services.

use crate::domain::value_objects::{ArithmeticError, HandlerId, OperationStatus};
use thiserror::Error;

/// Error type for domain rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Status change not allowed by the operation state machine.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current status.
        from: OperationStatus,
        /// Requested status.
        to: OperationStatus,
    },

    /// Amount is zero, negative or otherwise unusable.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Exchange rate is zero or negative.
    #[error("invalid rate: {0}")]
    InvalidRate(String),

    /// Operation already has a handler.
    #[error("operation already assigned to {0}")]
    AlreadyAssigned(HandlerId),

    /// Operation has no handler where one is required.
    #[error("operation is not assigned")]
    NotAssigned,

    /// Handler does not match the operation's current handler.
    #[error("handler {0} does not hold this operation")]
    HandlerMismatch(HandlerId),

    /// Generic validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Checked arithmetic failed.
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_error_names_both_states() {
        let err = DomainError::InvalidStateTransition {
            from: OperationStatus::Expired,
            to: OperationStatus::Active,
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition from EXPIRED to ACTIVE"
        );
    }

    #[test]
    fn arithmetic_converts() {
        let err: DomainError = ArithmeticError::DivisionByZero.into();
        assert!(matches!(err, DomainError::Arithmetic(_)));
    }
}
