//! # Application Layer
//!
//! Use cases built on the domain model and the persistence, partner and
//! callback ports.

pub mod error;
pub mod services;

pub use error::{
    ApplicationError, ApplicationResult, LedgerError, LedgerResult, RoutingError, RoutingResult,
};
