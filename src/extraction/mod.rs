//! Payload extraction module.
//!
//! Resolves the raw submission payload (object or one-element array) and
//! reads its fields under two regimes: strict typed reads for the normal
//! path and lenient coercing reads for the degraded save.

pub mod normalize;
pub mod payload;

pub use normalize::*;
pub use payload::*;
