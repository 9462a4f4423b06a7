//! Data models for stoq
//!
//! Defines the queued-operation record and its supporting enums.
//! These models are designed for full-record JSON persistence: every
//! mutation rewrites the whole entry under its id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of operation kinds the queue accepts
///
/// Kinds are labels for diagnostics and dispatch at enqueue time; the
/// synchronizer never interprets them and replays purely from the
/// envelope (endpoint, method, payload).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Sale of a stocked product
    ProductSale,
    /// Stock withdrawal (personal use, damage, correction)
    Withdrawal,
    /// New product registration
    ProductAdd,
    /// Service performed and posted
    ServiceAdd,
}

impl OperationKind {
    /// Stable wire label for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ProductSale => "product-sale",
            OperationKind::Withdrawal => "withdrawal",
            OperationKind::ProductAdd => "product-add",
            OperationKind::ServiceAdd => "service-add",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP verb used to replay an operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a queued operation
///
/// `Syncing` is transient: it marks an in-flight replay attempt and is
/// never trusted across a restart. Recovery rewrites it to `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Waiting for replay
    Pending,
    /// Replay attempt in flight
    Syncing,
    /// Retry cap exhausted; terminal until purged
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Syncing => "syncing",
            EntryStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A queued operation awaiting replay against the remote API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    /// Unique identifier: millisecond timestamp plus a random suffix
    pub id: String,
    /// What kind of operation this is
    pub kind: OperationKind,
    /// Exact JSON body to send on replay
    pub payload: serde_json::Value,
    /// API path the operation targets
    pub endpoint: String,
    /// HTTP verb to use
    pub method: HttpMethod,
    /// When the operation was captured; replay order follows this
    pub enqueued_at: DateTime<Utc>,
    /// Current lifecycle state
    pub status: EntryStatus,
    /// Completed replay attempts so far
    pub retry_count: u32,
    /// Message from the most recent failed attempt
    pub last_error: Option<String>,
    /// When the most recent attempt finished
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Create a new pending entry with a fresh id
    pub fn new(
        kind: OperationKind,
        payload: serde_json::Value,
        endpoint: impl Into<String>,
        method: HttpMethod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!(
                "{}-{}",
                now.timestamp_millis(),
                &Uuid::new_v4().to_string()[..8]
            ),
            kind,
            payload,
            endpoint: endpoint.into(),
            method,
            enqueued_at: now,
            status: EntryStatus::Pending,
            retry_count: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }

    /// Update the lifecycle state
    pub fn set_status(&mut self, status: EntryStatus) {
        self.status = status;
    }

    /// Record the outcome of a failed attempt
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.last_attempt_at = Some(Utc::now());
    }

    /// Whether a sync pass should pick this entry up
    pub fn is_eligible(&self, max_retries: u32) -> bool {
        self.status == EntryStatus::Pending && self.retry_count < max_retries
    }
}

/// Per-status counters over the queue
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueDepth {
    /// Entries waiting for replay
    pub pending: usize,
    /// Entries with an attempt in flight
    pub syncing: usize,
    /// Entries that exhausted their retries
    pub failed: usize,
}

impl QueueDepth {
    /// Total entries across all states
    pub fn total(&self) -> usize {
        self.pending + self.syncing + self.failed
    }

    /// Whether any captured data has not reached the server
    pub fn has_unsynced(&self) -> bool {
        self.pending > 0 || self.failed > 0
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl std::fmt::Display for QueueDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} pending, {} syncing, {} failed",
            self.pending, self.syncing, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_new() {
        let entry = QueueEntry::new(
            OperationKind::ProductSale,
            json!({"productId": "p1", "soldQuantity": 3}),
            "/api/products/sell",
            HttpMethod::Post,
        );

        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert!(entry.last_error.is_none());
        assert!(entry.last_attempt_at.is_none());
        assert_eq!(entry.endpoint, "/api/products/sell");
    }

    #[test]
    fn test_entry_id_format() {
        let entry = QueueEntry::new(
            OperationKind::Withdrawal,
            json!({}),
            "/api/products/withdraw",
            HttpMethod::Post,
        );

        let (millis, suffix) = entry.id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn test_entry_ids_are_unique() {
        let mk = || {
            QueueEntry::new(
                OperationKind::ProductAdd,
                json!({}),
                "/api/products",
                HttpMethod::Post,
            )
        };
        let a = mk();
        let b = mk();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_record_failure() {
        let mut entry = QueueEntry::new(
            OperationKind::ServiceAdd,
            json!({}),
            "/api/services",
            HttpMethod::Post,
        );

        entry.record_failure("server said no");
        assert_eq!(entry.last_error.as_deref(), Some("server said no"));
        assert!(entry.last_attempt_at.is_some());
    }

    #[test]
    fn test_eligibility() {
        let mut entry = QueueEntry::new(
            OperationKind::ProductSale,
            json!({}),
            "/api/products/sell",
            HttpMethod::Post,
        );

        assert!(entry.is_eligible(3));

        entry.retry_count = 2;
        assert!(entry.is_eligible(3));

        entry.retry_count = 3;
        assert!(!entry.is_eligible(3));

        entry.retry_count = 0;
        entry.set_status(EntryStatus::Failed);
        assert!(!entry.is_eligible(3));

        entry.set_status(EntryStatus::Syncing);
        assert!(!entry.is_eligible(3));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(OperationKind::ProductSale.as_str(), "product-sale");
        assert_eq!(OperationKind::Withdrawal.as_str(), "withdrawal");
        assert_eq!(OperationKind::ProductAdd.as_str(), "product-add");
        assert_eq!(OperationKind::ServiceAdd.as_str(), "service-add");

        let json = serde_json::to_string(&OperationKind::ProductSale).unwrap();
        assert_eq!(json, "\"product-sale\"");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&EntryStatus::Syncing).unwrap();
        assert_eq!(json, "\"syncing\"");

        let parsed: EntryStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, EntryStatus::Failed);
    }

    #[test]
    fn test_entry_serialization() {
        let mut entry = QueueEntry::new(
            OperationKind::ProductSale,
            json!({"productId": "p1", "soldQuantity": 3}),
            "/api/products/sell",
            HttpMethod::Post,
        );
        entry.record_failure("timeout");

        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: QueueEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, deserialized);
    }

    #[test]
    fn test_queue_depth() {
        let depth = QueueDepth {
            pending: 2,
            syncing: 1,
            failed: 1,
        };

        assert_eq!(depth.total(), 4);
        assert!(depth.has_unsynced());
        assert!(!depth.is_empty());

        let idle = QueueDepth {
            pending: 0,
            syncing: 1,
            failed: 0,
        };
        assert!(!idle.has_unsynced());

        assert!(QueueDepth::default().is_empty());
        assert_eq!(format!("{}", depth), "2 pending, 1 syncing, 1 failed");
    }
}
