//! Queue synchronizer
//!
//! Replays queued operations against the API, strictly in FIFO order
//! and one request at a time. Each entry is marked `syncing` for the
//! duration of its attempt, removed on acceptance, and put back to
//! `pending` (or `failed` once the retry cap is reached) on rejection.
//!
//! A response counts as accepted only when the status is 2xx and the
//! body does not carry `{"success": false}`; some endpoints report
//! domain failures that way instead of with an HTTP error code.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{EntryStatus, HttpMethod, QueueEntry};
use crate::queue::OperationQueue;

/// Shared bearer token for outgoing requests
///
/// Cloned into the synchronizer at startup; updating it here takes
/// effect on the next request without rebuilding anything.
#[derive(Clone, Default)]
pub struct AuthToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl AuthToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.inner.write().await = Some(token.into());
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    pub async fn get(&self) -> Option<String> {
        self.inner.read().await.clone()
    }
}

/// Outcome of a [`Synchronizer::sync_all`] pass
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries accepted by the server and removed
    pub synced: usize,
    /// Entries that failed this pass and stayed queued
    pub failed: usize,
    /// Entries that were eligible when the pass started
    pub total: usize,
}

impl SyncReport {
    /// Whether every eligible entry was accepted
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} synced, {} failed of {}",
            self.synced, self.failed, self.total
        )
    }
}

/// Replays queue entries against the API
pub struct Synchronizer {
    client: reqwest::Client,
    queue: OperationQueue,
    base_url: Option<String>,
    token: AuthToken,
    max_retries: u32,
    replay_gap: Duration,
}

impl Synchronizer {
    pub fn new(config: &Config, queue: OperationQueue, token: AuthToken) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            queue,
            base_url: config.api_url.clone(),
            token,
            max_retries: config.max_retries,
            replay_gap: config.replay_gap(),
        })
    }

    /// Replay one entry; returns whether the server accepted it
    ///
    /// Accepted entries are removed from the queue. Rejected entries get
    /// the failure recorded and go back to `pending`, or to `failed`
    /// once the retry cap is reached. Errors never propagate from here:
    /// a sync pass must survive any single entry going wrong.
    pub async fn sync_one(&self, entry: &QueueEntry) -> bool {
        if let Err(e) = self
            .queue
            .set_status(&entry.id, EntryStatus::Syncing, None)
        {
            warn!(id = %entry.id, error = %e, "could not mark entry as syncing");
        }

        match self.replay(entry).await {
            Ok(()) => {
                if let Err(e) = self.queue.remove(&entry.id) {
                    warn!(id = %entry.id, error = %e, "accepted entry could not be removed");
                }
                info!(id = %entry.id, kind = %entry.kind, "operation synced");
                true
            }
            Err(e) => {
                let reason = format!("{e:#}");
                let retries = entry.retry_count + 1;
                let status = if retries >= self.max_retries {
                    EntryStatus::Failed
                } else {
                    EntryStatus::Pending
                };

                if let Err(e) = self.queue.record_failure(&entry.id, &reason) {
                    warn!(id = %entry.id, error = %e, "could not record sync failure");
                }
                if let Err(e) = self.queue.set_status(&entry.id, status, Some(retries)) {
                    warn!(id = %entry.id, error = %e, "could not update entry after failure");
                }

                if status == EntryStatus::Failed {
                    warn!(id = %entry.id, retries, error = %reason, "operation exhausted its retries");
                } else {
                    warn!(id = %entry.id, retry = retries, error = %reason, "operation sync failed");
                }
                false
            }
        }
    }

    /// Replay every eligible entry in FIFO order
    ///
    /// Eligible means `pending` with retries left. Entries are replayed
    /// strictly one at a time with a short gap between requests so a
    /// reconnection does not flood the server.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let eligible: Vec<QueueEntry> = self
            .queue
            .list_all()
            .context("could not read the operation queue")?
            .into_iter()
            .filter(|e| e.is_eligible(self.max_retries))
            .collect();

        let total = eligible.len();
        if total == 0 {
            debug!("no eligible entries to sync");
            return Ok(SyncReport::default());
        }

        info!(total, "sync pass started");
        let mut report = SyncReport {
            total,
            ..SyncReport::default()
        };

        for (i, entry) in eligible.iter().enumerate() {
            if self.sync_one(entry).await {
                report.synced += 1;
            } else {
                report.failed += 1;
            }
            if i + 1 < total {
                tokio::time::sleep(self.replay_gap).await;
            }
        }

        info!(
            synced = report.synced,
            failed = report.failed,
            total = report.total,
            "sync pass finished"
        );
        Ok(report)
    }

    async fn replay(&self, entry: &QueueEntry) -> Result<()> {
        let base = self
            .base_url
            .as_deref()
            .context("api_url is not configured")?;
        let url = format!("{}{}", base.trim_end_matches('/'), entry.endpoint);

        let method = match entry.method {
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut request = self.client.request(method, &url).json(&entry.payload);
        if let Some(token) = self.token.get().await {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("server returned {status}");
        }

        // An unparsable or empty body on a 2xx still counts as accepted
        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(_) => return Ok(()),
        };
        if body.get("success").and_then(|v| v.as_bool()) == Some(false) {
            let message = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("server rejected the operation");
            anyhow::bail!("{message}");
        }

        Ok(())
    }
}
