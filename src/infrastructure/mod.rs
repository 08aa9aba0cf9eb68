//! # Infrastructure Layer
//!
//! Adapters for persistence, aggregator partners, callbacks and
//! notifications, plus configuration and telemetry.

pub mod callbacks;
pub mod config;
pub mod notifications;
pub mod partners;
pub mod persistence;
pub mod telemetry;
