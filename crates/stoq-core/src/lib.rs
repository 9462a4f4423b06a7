//! STOQ Core Library
//!
//! This crate provides the core functionality for STOQ (Store-and-forward
//! Operation Queue), an offline-first capture and sync engine for business
//! operations such as sales and inventory changes.
//!
//! # Architecture
//!
//! - **SQLite**: Source of truth for queued operations, survives restarts
//!
//! Operations are captured locally first and replayed against the API in
//! FIFO order once connectivity allows.
//!
//! # Quick Start
//!
//! ```text
//! let store = Arc::new(DurableStore::open_or_fallback(&config)?);
//! let queue = OperationQueue::new(store);
//!
//! // Capture a sale, online or not
//! queue_product_sale(&queue, ProductSalePayload {
//!     product_id: "prod-1".into(),
//!     sold_quantity: 2,
//!     sale_price: Some(12.50),
//! })?;
//!
//! // Wire up background sync
//! let monitor = spawn_monitor(&config, client);
//! let synchronizer = Synchronizer::new(&config, queue.clone(), token)?;
//! let orchestrator = spawn_orchestrator(&config, queue, monitor, synchronizer)?;
//! ```
//!
//! # Modules
//!
//! - `queue`: Durable FIFO operation queue (main entry point)
//! - `models`: Data structures for queue entries and depth counters
//! - `ops`: Typed capture helpers for the supported operation kinds
//! - `monitor`: Background connectivity probing
//! - `sync`: Queue replay against the API
//! - `orchestrator`: Background task tying monitor, queue, and sync together
//! - `storage`: SQLite persistence with in-memory fallback
//! - `config`: Application configuration

pub mod config;
pub mod models;
pub mod monitor;
pub mod ops;
pub mod orchestrator;
pub mod queue;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod testsupport;

pub use config::Config;
pub use models::{EntryStatus, HttpMethod, OperationKind, QueueDepth, QueueEntry};
pub use monitor::{spawn_monitor, ConnectivityState, MonitorHandle};
pub use ops::{
    queue_product_add, queue_product_sale, queue_service_add, queue_withdrawal, Operation,
    ProductAddPayload, ProductSalePayload, ServiceAddPayload, WithdrawalPayload,
};
pub use orchestrator::{
    spawn_orchestrator, OfflineStatus, OrchestratorError, OrchestratorEvent, OrchestratorHandle,
    QueueReport,
};
pub use queue::OperationQueue;
pub use storage::{DurableStore, StorageError, StorageResult};
pub use sync::{AuthToken, SyncReport, Synchronizer};
