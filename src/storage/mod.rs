//! Storage module.
//!
//! Record schema, the store boundary, an in-memory store and SQL query
//! builders for hosts that execute statements against PostgreSQL.

pub mod filter;
pub mod memory;
pub mod models;
pub mod queries;
pub mod store;

pub use filter::*;
pub use memory::MemoryStore;
pub use models::*;
pub use store::*;
