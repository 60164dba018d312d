//! Pipeline orchestration module.
//!
//! Submission intake that coordinates:
//! - Request context capture
//! - Client IP and user-agent enrichment
//! - Offline geolocation
//! - Record construction and persistence
//! - The degraded fallback save

pub mod context;
pub mod intake;

pub use context::*;
pub use intake::*;
