//! # Partner Errors
//!
//! Error types for calls to external aggregator partners.
//!
//! # Examples
//!
//! ```
//! use deal_router::infrastructure::partners::error::PartnerError;
//!
//! let error = PartnerError::timeout("no answer after 5000ms");
//! assert!(error.is_retryable());
//!
//! let error = PartnerError::authentication("bad token");
//! assert!(!error.is_retryable());
//! ```

use crate::domain::value_objects::AttemptOutcome;
use thiserror::Error;

/// Error type for partner client operations.
#[derive(Debug, Clone, Error)]
pub enum PartnerError {
    /// Request timed out.
    #[error("partner timeout: {message}")]
    Timeout {
        /// Error message.
        message: String,
        /// Timeout duration in milliseconds.
        timeout_ms: Option<u64>,
    },

    /// Network or connection error, including 5xx answers.
    #[error("partner connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
        /// HTTP status, when one was received.
        status_code: Option<u16>,
    },

    /// Authentication or authorization failure.
    #[error("partner authentication error: {message}")]
    Authentication {
        /// Error message.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("partner rate limit exceeded: {message}")]
    RateLimited {
        /// Error message.
        message: String,
    },

    /// The partner refused the request payload.
    #[error("partner invalid request: {message}")]
    InvalidRequest {
        /// Error message.
        message: String,
    },

    /// The partner answered but declined the deal.
    #[error("partner rejected deal: {message}")]
    Rejected {
        /// Error message.
        message: String,
    },

    /// Protocol or format error.
    #[error("partner protocol error: {message}")]
    ProtocolError {
        /// Error message.
        message: String,
        /// HTTP status, when one was received.
        status_code: Option<u16>,
    },

    /// Local failure building or sending the request.
    #[error("partner internal error: {message}")]
    InternalError {
        /// Error message.
        message: String,
    },
}

impl PartnerError {
    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
            timeout_ms: None,
        }
    }

    /// Creates a timeout error with duration.
    #[must_use]
    pub fn timeout_with_duration(message: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            message: message.into(),
            timeout_ms: Some(timeout_ms),
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            status_code: None,
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    /// Creates an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a rejection.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
            status_code: None,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Attaches the HTTP status to connection and protocol errors.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        match &mut self {
            Self::Connection { status_code, .. } | Self::ProtocolError { status_code, .. } => {
                *status_code = Some(status);
            }
            _ => {}
        }
        self
    }

    /// Returns the HTTP status carried by the error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Connection { status_code, .. } | Self::ProtocolError { status_code, .. } => {
                *status_code
            }
            Self::Authentication { .. } => Some(401),
            Self::RateLimited { .. } => Some(429),
            Self::InvalidRequest { .. } => Some(400),
            _ => None,
        }
    }

    /// Returns true if this error is transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connection { .. } | Self::RateLimited { .. }
        )
    }

    /// Returns true if this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Classifies the error for the integration log.
    #[must_use]
    pub fn attempt_outcome(&self) -> AttemptOutcome {
        match self {
            Self::Timeout { .. } => AttemptOutcome::Timeout,
            Self::Rejected { .. } | Self::InvalidRequest { .. } => AttemptOutcome::Rejected,
            _ => AttemptOutcome::Error,
        }
    }
}

/// Result type for partner client operations.
pub type PartnerResult<T> = Result<T, PartnerError>;
