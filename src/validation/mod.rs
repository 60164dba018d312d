//! Validation module.
//!
//! Boundary checks that run before any store access:
//! - Record constraints enforced on create (email shape)
//! - Query parameter parsing for listing/export/analytics requests
//! - Status and bulk-update payload validation

pub mod params;
pub mod record;

pub use params::*;
pub use record::*;
