//! Structured logging with request context.
//!
//! Provides the log context and logger bootstrap so that every message
//! carries the request_id (and submission_id once known) for correlation.

pub mod structured;

pub use structured::*;
