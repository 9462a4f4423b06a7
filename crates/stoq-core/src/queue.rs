//! Operation queue
//!
//! Durable FIFO queue of captured write operations. Entries are stored
//! as full JSON records keyed by id; every mutation is an idempotent
//! overwrite, so interrupted writers never leave partial state behind.
//!
//! The queue enforces lifecycle rules (unique ids, FIFO listing,
//! benign no-ops for absent ids) but holds no replay policy; retry
//! decisions live in the synchronizer.

use std::sync::Arc;

use tracing::debug;

use crate::models::{EntryStatus, HttpMethod, OperationKind, QueueDepth, QueueEntry};
use crate::storage::{DurableStore, StorageResult};

/// Durable, dependency-injected operation queue
///
/// Clones share the same underlying store; hand a clone to every
/// component that needs queue access.
#[derive(Clone)]
pub struct OperationQueue {
    store: Arc<DurableStore>,
}

impl OperationQueue {
    /// Create a queue over an opened store
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    /// Access the underlying store
    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    /// Whether queued entries survive a process restart
    pub fn is_persistent(&self) -> bool {
        self.store.is_persistent()
    }

    /// Capture an operation; returns the assigned entry id
    ///
    /// The new entry starts `pending` with zero completed attempts and
    /// `enqueued_at` set to now, which fixes its replay position.
    pub fn enqueue(
        &self,
        kind: OperationKind,
        payload: serde_json::Value,
        endpoint: &str,
        method: HttpMethod,
    ) -> StorageResult<String> {
        let entry = QueueEntry::new(kind, payload, endpoint, method);
        self.store.set(&entry.id, &entry)?;
        debug!(id = %entry.id, kind = %entry.kind, endpoint = %entry.endpoint, "operation queued");
        Ok(entry.id)
    }

    /// Read a single entry
    pub fn get(&self, id: &str) -> StorageResult<Option<QueueEntry>> {
        self.store.get(id)
    }

    /// All entries in replay order (ascending `enqueued_at`, ties by id)
    pub fn list_all(&self) -> StorageResult<Vec<QueueEntry>> {
        let mut entries: Vec<QueueEntry> = self.store.iter_all()?;
        entries.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entries)
    }

    /// Update an entry's status, and optionally its retry count
    ///
    /// An absent id is a benign no-op: the entry may have been removed
    /// by a concurrent successful replay.
    pub fn set_status(
        &self,
        id: &str,
        status: EntryStatus,
        retry_count: Option<u32>,
    ) -> StorageResult<()> {
        let Some(mut entry) = self.store.get::<QueueEntry>(id)? else {
            debug!(id, "status update for absent entry ignored");
            return Ok(());
        };

        entry.set_status(status);
        if let Some(retries) = retry_count {
            entry.retry_count = retries;
        }
        self.store.set(id, &entry)
    }

    /// Record the error message and time of a failed attempt
    ///
    /// Absent ids are ignored, as in `set_status`.
    pub fn record_failure(&self, id: &str, error: &str) -> StorageResult<()> {
        let Some(mut entry) = self.store.get::<QueueEntry>(id)? else {
            debug!(id, "failure record for absent entry ignored");
            return Ok(());
        };

        entry.record_failure(error);
        self.store.set(id, &entry)
    }

    /// Remove an entry; removing an absent id succeeds
    pub fn remove(&self, id: &str) -> StorageResult<bool> {
        self.store.remove(id)
    }

    /// Number of entries in the queue
    pub fn count(&self) -> StorageResult<usize> {
        Ok(self.store.count()? as usize)
    }

    /// Per-status counters
    pub fn depth(&self) -> StorageResult<QueueDepth> {
        let mut depth = QueueDepth::default();
        for entry in self.store.iter_all::<QueueEntry>()? {
            match entry.status {
                EntryStatus::Pending => depth.pending += 1,
                EntryStatus::Syncing => depth.syncing += 1,
                EntryStatus::Failed => depth.failed += 1,
            }
        }
        Ok(depth)
    }

    /// Remove every terminally failed entry; returns how many
    pub fn purge_failed(&self) -> StorageResult<usize> {
        let mut purged = 0;
        for entry in self.store.iter_all::<QueueEntry>()? {
            if entry.status == EntryStatus::Failed && self.store.remove(&entry.id)? {
                purged += 1;
            }
        }
        debug!(purged, "failed entries purged");
        Ok(purged)
    }

    /// Rewrite entries stranded in `syncing` back to `pending`
    ///
    /// Run once at startup: a persisted `syncing` status means the
    /// process died mid-attempt, and the outcome is unknown. Retry
    /// counts are left untouched.
    pub fn recover_interrupted(&self) -> StorageResult<usize> {
        let mut recovered = 0;
        for entry in self.store.iter_all::<QueueEntry>()? {
            if entry.status == EntryStatus::Syncing {
                self.set_status(&entry.id, EntryStatus::Pending, None)?;
                recovered += 1;
            }
        }
        if recovered > 0 {
            debug!(recovered, "interrupted entries recovered to pending");
        }
        Ok(recovered)
    }

    /// Remove every entry regardless of status
    pub fn clear(&self) -> StorageResult<()> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn test_queue() -> OperationQueue {
        OperationQueue::new(Arc::new(DurableStore::open_in_memory().unwrap()))
    }

    /// Write an entry with a controlled timestamp and state straight to
    /// the store, bypassing `enqueue`
    fn plant(
        queue: &OperationQueue,
        id: &str,
        minutes_ago: i64,
        status: EntryStatus,
        retry_count: u32,
    ) {
        let mut entry = QueueEntry::new(
            OperationKind::ProductSale,
            json!({"productId": "p1", "soldQuantity": 1}),
            "/api/products/sell",
            HttpMethod::Post,
        );
        entry.id = id.to_string();
        entry.enqueued_at = Utc::now() - ChronoDuration::minutes(minutes_ago);
        entry.status = status;
        entry.retry_count = retry_count;
        queue.store().set(id, &entry).unwrap();
    }

    #[test]
    fn test_enqueue_sets_initial_state() {
        let queue = test_queue();

        let id = queue
            .enqueue(
                OperationKind::ProductSale,
                json!({"productId": "p1", "soldQuantity": 3}),
                "/api/products/sell",
                HttpMethod::Post,
            )
            .unwrap();

        let entry = queue.get(&id).unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.payload["productId"], "p1");
        assert_eq!(queue.count().unwrap(), 1);
    }

    #[test]
    fn test_enqueue_assigns_unique_ids() {
        let queue = test_queue();
        let mut ids = std::collections::HashSet::new();

        for _ in 0..100 {
            let id = queue
                .enqueue(
                    OperationKind::Withdrawal,
                    json!({}),
                    "/api/products/withdraw",
                    HttpMethod::Post,
                )
                .unwrap();
            assert!(ids.insert(id), "duplicate id assigned");
        }
        assert_eq!(queue.count().unwrap(), 100);
    }

    #[test]
    fn test_list_all_is_fifo() {
        let queue = test_queue();

        plant(&queue, "newest", 1, EntryStatus::Pending, 0);
        plant(&queue, "oldest", 30, EntryStatus::Pending, 0);
        plant(&queue, "middle", 10, EntryStatus::Failed, 3);

        let ids: Vec<String> = queue
            .list_all()
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["oldest", "middle", "newest"]);
    }

    #[test]
    fn test_list_all_breaks_ties_by_id() {
        let queue = test_queue();
        let stamp = Utc::now();

        for id in ["b", "a", "c"] {
            let mut entry = QueueEntry::new(
                OperationKind::ProductAdd,
                json!({}),
                "/api/products",
                HttpMethod::Post,
            );
            entry.id = id.to_string();
            entry.enqueued_at = stamp;
            queue.store().set(id, &entry).unwrap();
        }

        let ids: Vec<String> = queue
            .list_all()
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_set_status_updates_entry() {
        let queue = test_queue();
        plant(&queue, "op", 1, EntryStatus::Pending, 0);

        queue
            .set_status("op", EntryStatus::Syncing, None)
            .unwrap();
        assert_eq!(
            queue.get("op").unwrap().unwrap().status,
            EntryStatus::Syncing
        );

        queue
            .set_status("op", EntryStatus::Pending, Some(2))
            .unwrap();
        let entry = queue.get("op").unwrap().unwrap();
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.retry_count, 2);
    }

    #[test]
    fn test_set_status_absent_id_is_noop() {
        let queue = test_queue();

        queue
            .set_status("ghost", EntryStatus::Failed, Some(3))
            .unwrap();
        assert_eq!(queue.count().unwrap(), 0);
        assert!(queue.get("ghost").unwrap().is_none());
    }

    #[test]
    fn test_record_failure() {
        let queue = test_queue();
        plant(&queue, "op", 1, EntryStatus::Pending, 0);

        queue.record_failure("op", "connection refused").unwrap();
        let entry = queue.get("op").unwrap().unwrap();
        assert_eq!(entry.last_error.as_deref(), Some("connection refused"));
        assert!(entry.last_attempt_at.is_some());

        // Absent id is ignored
        queue.record_failure("ghost", "whatever").unwrap();
        assert!(queue.get("ghost").unwrap().is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let queue = test_queue();
        plant(&queue, "op", 1, EntryStatus::Pending, 0);

        assert!(queue.remove("op").unwrap());
        assert!(!queue.remove("op").unwrap());
        assert!(!queue.remove("never-there").unwrap());
        assert_eq!(queue.count().unwrap(), 0);
    }

    #[test]
    fn test_depth_counts_by_status() {
        let queue = test_queue();

        plant(&queue, "p1", 5, EntryStatus::Pending, 0);
        plant(&queue, "p2", 4, EntryStatus::Pending, 1);
        plant(&queue, "s1", 3, EntryStatus::Syncing, 0);
        plant(&queue, "f1", 2, EntryStatus::Failed, 3);

        let depth = queue.depth().unwrap();
        assert_eq!(depth.pending, 2);
        assert_eq!(depth.syncing, 1);
        assert_eq!(depth.failed, 1);
        assert_eq!(depth.total(), 4);
    }

    #[test]
    fn test_purge_failed_leaves_others() {
        let queue = test_queue();

        plant(&queue, "p1", 5, EntryStatus::Pending, 0);
        plant(&queue, "f1", 4, EntryStatus::Failed, 3);
        plant(&queue, "f2", 3, EntryStatus::Failed, 3);

        assert_eq!(queue.purge_failed().unwrap(), 2);
        assert_eq!(queue.count().unwrap(), 1);
        assert!(queue.get("p1").unwrap().is_some());
    }

    #[test]
    fn test_recover_interrupted() {
        let queue = test_queue();

        plant(&queue, "stuck1", 5, EntryStatus::Syncing, 1);
        plant(&queue, "stuck2", 4, EntryStatus::Syncing, 0);
        plant(&queue, "fine", 3, EntryStatus::Pending, 0);

        assert_eq!(queue.recover_interrupted().unwrap(), 2);

        let e1 = queue.get("stuck1").unwrap().unwrap();
        assert_eq!(e1.status, EntryStatus::Pending);
        // Retry count untouched by recovery
        assert_eq!(e1.retry_count, 1);
        assert_eq!(
            queue.get("stuck2").unwrap().unwrap().status,
            EntryStatus::Pending
        );
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stoq.db");

        let id = {
            let store = Arc::new(DurableStore::open_at(&path).unwrap());
            let queue = OperationQueue::new(store);
            queue
                .enqueue(
                    OperationKind::ServiceAdd,
                    json!({"description": "haircut", "price": 25.0}),
                    "/api/services",
                    HttpMethod::Post,
                )
                .unwrap()
        };

        let store = Arc::new(DurableStore::open_at(&path).unwrap());
        let queue = OperationQueue::new(store);

        let entry = queue.get(&id).unwrap().unwrap();
        assert_eq!(entry.payload["description"], "haircut");
        assert_eq!(entry.status, EntryStatus::Pending);
    }
}
