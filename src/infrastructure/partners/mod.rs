//! # Aggregator Partners
//!
//! Client port and HTTP adapter for external aggregator partners.

pub mod error;
pub mod http_client;
pub mod traits;

pub use error::{PartnerError, PartnerResult};
pub use http_client::HttpPartnerClient;
pub use traits::{PartnerClient, PartnerEndpoint, RemoteDeal, RemoteDealRequest};
