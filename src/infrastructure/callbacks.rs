//! # Signed Partner Callbacks
//!
//! Verification of status callbacks sent by partners that sign their
//! requests with an asymmetric key.
//!
//! The signed payload is the canonical string
//!
//! ```text
//! timestamp|partnerName|operationKey|operationType
//! ```
//!
//! and the timestamp must be within a tolerance (±120 s by default) of
//! receipt. The cryptographic check itself is delegated to a
//! [`SignatureVerifier`].
//!
//! # Examples
//!
//! ```
//! use deal_router::infrastructure::callbacks::{CallbackFields, canonical_string};
//!
//! let fields = CallbackFields {
//!     partner_name: "acme".to_string(),
//!     operation_key: "op-1".to_string(),
//!     operation_type: "COMPLETED".to_string(),
//! };
//! assert_eq!(canonical_string(1_700_000_000, &fields), "1700000000|acme|op-1|COMPLETED");
//! ```

use crate::domain::value_objects::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Default accepted clock skew in seconds.
pub const DEFAULT_TIMESTAMP_TOLERANCE_SECS: u64 = 120;

/// Errors raised while verifying a callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// Signature did not verify.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// Timestamp outside the tolerance window.
    #[error("timestamp expired: {timestamp} is {skew_secs}s away from receipt")]
    TimestampExpired {
        /// Timestamp carried by the callback, in seconds.
        timestamp: i64,
        /// Distance from the receipt time.
        skew_secs: u64,
    },

    /// Operation type not understood.
    #[error("unsupported operation type: {0}")]
    UnsupportedType(String),

    /// Operation key is not a valid operation ID.
    #[error("invalid operation key: {0}")]
    InvalidOperationKey(String),
}

/// Signed headers of a callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackHeaders {
    /// Unix seconds at signing.
    pub timestamp: i64,
    /// Encoded signature.
    pub signature: String,
}

/// Body fields covered by the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackFields {
    /// Partner display name.
    pub partner_name: String,
    /// Operation identifier as the partner knows it.
    pub operation_key: String,
    /// Reported status.
    pub operation_type: String,
}

/// Builds the signed string.
#[must_use]
pub fn canonical_string(timestamp: i64, fields: &CallbackFields) -> String {
    format!(
        "{timestamp}|{}|{}|{}",
        fields.partner_name, fields.operation_key, fields.operation_type
    )
}

/// Port for the asymmetric signature check.
pub trait SignatureVerifier: Send + Sync + fmt::Debug {
    /// Verifies `signature` over `canonical` for `partner_name`.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the signature is not valid.
    fn verify(&self, partner_name: &str, canonical: &str, signature: &str) -> Result<(), String>;
}

/// Checks timestamp freshness and signature of incoming callbacks.
#[derive(Debug, Clone)]
pub struct CallbackVerifier {
    verifier: Arc<dyn SignatureVerifier>,
    tolerance_secs: u64,
}

impl CallbackVerifier {
    /// Creates a verifier with the default tolerance.
    #[must_use]
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            verifier,
            tolerance_secs: DEFAULT_TIMESTAMP_TOLERANCE_SECS,
        }
    }

    /// Sets the timestamp tolerance.
    #[must_use]
    pub fn with_tolerance_secs(mut self, tolerance_secs: u64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Returns the timestamp tolerance.
    #[inline]
    #[must_use]
    pub fn tolerance_secs(&self) -> u64 {
        self.tolerance_secs
    }

    /// Verifies a callback received at `received_at`.
    ///
    /// # Errors
    ///
    /// Returns `CallbackError::TimestampExpired` if the timestamp is outside
    /// the tolerance, or `CallbackError::SignatureInvalid` if the signature
    /// check fails.
    pub fn verify(
        &self,
        headers: &CallbackHeaders,
        fields: &CallbackFields,
        received_at: Timestamp,
    ) -> Result<(), CallbackError> {
        let skew_secs = headers.timestamp.abs_diff(received_at.timestamp_secs());
        if skew_secs > self.tolerance_secs {
            return Err(CallbackError::TimestampExpired {
                timestamp: headers.timestamp,
                skew_secs,
            });
        }
        let canonical = canonical_string(headers.timestamp, fields);
        self.verifier
            .verify(&fields.partner_name, &canonical, &headers.signature)
            .map_err(CallbackError::SignatureInvalid)
    }
}
