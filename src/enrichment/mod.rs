//! Enrichment module.
//!
//! Derives technical metadata for a submission from its request:
//! - Client IP normalization
//! - User-agent parsing (browser / OS / device identity)
//! - Device type classification
//! - Offline geolocation lookup

pub mod device;
pub mod geo;
pub mod ip;
pub mod user_agent;

pub use device::*;
pub use geo::*;
pub use ip::*;
pub use user_agent::*;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnrichmentError {
    #[error("user-agent parse failed: {0}")]
    UserAgent(String),

    #[error("geolocation lookup failed: {0}")]
    GeoLookup(String),

    #[error("invalid geolocation table: {0}")]
    GeoTable(String),
}
