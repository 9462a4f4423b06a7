//! Storage layer
//!
//! Durable SQLite-backed key-value store with a queue namespace and a
//! TTL cache namespace.
//!
//! ## Architecture
//!
//! - **queue namespace**: full-record JSON values keyed by entry id,
//!   every mutation an idempotent overwrite
//! - **cache namespace**: TTL-stamped values, expired rows treated as
//!   absent and removed lazily
//!
//! The store degrades to in-memory when the database file is unusable,
//! so a broken disk never takes the queue API down.

pub mod error;
pub mod schema;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use store::DurableStore;
