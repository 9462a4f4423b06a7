//! Offline sync orchestrator
//!
//! Ties the queue, the connectivity monitor, and the synchronizer
//! together behind a single task. The orchestrator:
//!
//! - recovers entries stranded in `syncing` by a previous crash
//! - replays the queue shortly after connectivity comes back, with a
//!   debounce so a flapping connection does not trigger bursts
//! - keeps an [`OfflineStatus`] snapshot published over a watch channel
//! - serves user-initiated syncs, queue inspection, and failed-entry
//!   cleanup over a command channel
//!
//! At most one sync pass runs at a time. Requests that arrive while a
//! pass is running are rejected rather than queued.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{QueueDepth, QueueEntry};
use crate::monitor::{ConnectivityState, MonitorHandle};
use crate::queue::OperationQueue;
use crate::storage::StorageError;
use crate::sync::{SyncReport, Synchronizer};

/// Errors surfaced to callers of the orchestrator handle
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("cannot sync while offline")]
    Offline,

    #[error("a sync pass is already running")]
    SyncInProgress,

    #[error("sync failed: {0}")]
    Sync(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("the sync service is not running")]
    ChannelClosed,
}

/// Combined view of connectivity, queue depth, and sync health
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OfflineStatus {
    /// Connectivity as last probed
    pub connectivity: ConnectivityState,
    /// Queue depth as last recomputed
    pub depth: QueueDepth,
    /// Why the last sync pass could not run, if it could not
    pub last_sync_error: Option<String>,
    /// False when the queue degraded to in-memory storage
    pub storage_persistent: bool,
}

impl OfflineStatus {
    /// Whether any captured operation has not reached the server
    pub fn has_unsynced_data(&self) -> bool {
        self.depth.has_unsynced()
    }

    /// Online, nothing terminally failed, and the last pass ran
    pub fn is_healthy(&self) -> bool {
        self.connectivity.online && self.depth.failed == 0 && self.last_sync_error.is_none()
    }
}

/// Queue depth plus the raw entries, for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueReport {
    pub depth: QueueDepth,
    /// Entries in replay order
    pub entries: Vec<QueueEntry>,
}

/// Notifications emitted by the orchestrator task
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// A sync pass started
    SyncStarted,
    /// A sync pass ran to completion
    SyncFinished(SyncReport),
    /// A sync pass could not run at all
    SyncFailed(String),
    /// Connectivity was regained
    Online,
    /// Connectivity was lost
    Offline,
}

/// Commands handled by the orchestrator task
#[derive(Debug)]
pub enum OrchestratorCommand {
    /// Probe connectivity and sync now, replying with the outcome
    ForceSync(oneshot::Sender<Result<SyncReport, OrchestratorError>>),
    /// Remove terminally failed entries, replying with how many
    ClearFailed(oneshot::Sender<Result<usize, OrchestratorError>>),
    /// Reply with depth and raw entries
    QueueStatus(oneshot::Sender<Result<QueueReport, OrchestratorError>>),
    /// Internal: a reconnect debounce timer elapsed
    ReconnectElapsed(u64),
    /// Stop the orchestrator and its monitor
    Shutdown,
}

/// Handle to the orchestrator task
pub struct OrchestratorHandle {
    command_tx: mpsc::Sender<OrchestratorCommand>,
    status_rx: watch::Receiver<OfflineStatus>,
    event_rx: Option<mpsc::Receiver<OrchestratorEvent>>,
    monitor: MonitorHandle,
}

impl OrchestratorHandle {
    /// Snapshot of the current status
    pub fn status(&self) -> OfflineStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<OfflineStatus> {
        self.status_rx.clone()
    }

    /// Take the event receiver (can only be taken once)
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<OrchestratorEvent>> {
        self.event_rx.take()
    }

    /// The connectivity monitor behind this orchestrator
    pub fn monitor(&self) -> &MonitorHandle {
        &self.monitor
    }

    /// Probe connectivity, then sync the whole queue now
    ///
    /// Rejects with [`OrchestratorError::Offline`] when the probe finds
    /// the API unreachable, and with
    /// [`OrchestratorError::SyncInProgress`] when a pass is running.
    pub async fn force_sync(&self) -> Result<SyncReport, OrchestratorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(OrchestratorCommand::ForceSync(reply_tx))
            .await
            .map_err(|_| OrchestratorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| OrchestratorError::ChannelClosed)?
    }

    /// Remove every terminally failed entry
    pub async fn clear_failed(&self) -> Result<usize, OrchestratorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(OrchestratorCommand::ClearFailed(reply_tx))
            .await
            .map_err(|_| OrchestratorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| OrchestratorError::ChannelClosed)?
    }

    /// Depth counters plus the raw entries in replay order
    pub async fn queue_status(&self) -> Result<QueueReport, OrchestratorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(OrchestratorCommand::QueueStatus(reply_tx))
            .await
            .map_err(|_| OrchestratorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| OrchestratorError::ChannelClosed)?
    }

    /// Stop the orchestrator task and its monitor
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(OrchestratorCommand::Shutdown).await;
    }
}

/// Spawn the orchestrator task
///
/// Runs startup recovery before the task starts: entries stranded in
/// `syncing` go back to `pending`, the store is probed, and the initial
/// depth snapshot is taken. With `sync_on_start` set, an initial sync
/// pass runs as soon as a probe confirms the API is reachable.
pub fn spawn_orchestrator(
    config: &Config,
    queue: OperationQueue,
    monitor: MonitorHandle,
    synchronizer: Synchronizer,
) -> Result<OrchestratorHandle, OrchestratorError> {
    let recovered = queue.recover_interrupted()?;
    if recovered > 0 {
        info!(recovered, "operations interrupted by a previous shutdown recovered");
    }
    if let Err(e) = queue.store().self_check() {
        warn!(error = %e, "storage self check failed at startup");
    }

    let status = OfflineStatus {
        connectivity: monitor.state(),
        depth: queue.depth()?,
        last_sync_error: None,
        storage_persistent: queue.is_persistent(),
    };

    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);
    let (status_tx, status_rx) = watch::channel(status.clone());
    let (done_tx, done_rx) = mpsc::channel(1);

    let task = OrchestratorTask {
        queue,
        synchronizer: Arc::new(synchronizer),
        monitor: monitor.clone(),
        status,
        status_tx,
        event_tx,
        done_tx,
        command_tx: command_tx.clone(),
        busy: false,
        reconnect_seq: 0,
        reconnect_debounce: config.reconnect_debounce(),
    };

    tokio::spawn(orchestrator_task_loop(
        task,
        config.sync_on_start,
        config.housekeeping_interval(),
        command_rx,
        done_rx,
    ));

    Ok(OrchestratorHandle {
        command_tx,
        status_rx,
        event_rx: Some(event_rx),
        monitor,
    })
}

type PassReply = oneshot::Sender<Result<SyncReport, OrchestratorError>>;
type PassOutcome = (anyhow::Result<SyncReport>, Option<PassReply>);

struct OrchestratorTask {
    queue: OperationQueue,
    synchronizer: Arc<Synchronizer>,
    monitor: MonitorHandle,
    status: OfflineStatus,
    status_tx: watch::Sender<OfflineStatus>,
    event_tx: mpsc::Sender<OrchestratorEvent>,
    done_tx: mpsc::Sender<PassOutcome>,
    command_tx: mpsc::Sender<OrchestratorCommand>,
    busy: bool,
    /// Generation of the most recently armed reconnect timer
    reconnect_seq: u64,
    reconnect_debounce: Duration,
}

async fn orchestrator_task_loop(
    mut task: OrchestratorTask,
    sync_on_start: bool,
    housekeeping_interval: Duration,
    mut command_rx: mpsc::Receiver<OrchestratorCommand>,
    mut done_rx: mpsc::Receiver<PassOutcome>,
) {
    let mut connectivity_rx = task.monitor.subscribe();
    let mut housekeeping = tokio::time::interval(housekeeping_interval);

    if sync_on_start {
        let state = task.monitor.force_check().await;
        task.status.connectivity = state.clone();
        task.publish();
        if state.online && task.status.depth.pending > 0 {
            info!(
                pending = task.status.depth.pending,
                "unsynced operations found at startup"
            );
            task.start_pass(None).await;
        }
    }

    loop {
        tokio::select! {
            _ = housekeeping.tick() => {
                task.housekeeping();
            }
            changed = connectivity_rx.changed() => {
                match changed {
                    Ok(()) => {
                        let state = connectivity_rx.borrow_and_update().clone();
                        task.apply_connectivity(state).await;
                    }
                    Err(_) => break,
                }
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(OrchestratorCommand::ForceSync(reply)) => {
                        task.force_sync(reply).await;
                    }
                    Some(OrchestratorCommand::ClearFailed(reply)) => {
                        let _ = reply.send(task.clear_failed());
                    }
                    Some(OrchestratorCommand::QueueStatus(reply)) => {
                        let _ = reply.send(task.queue_report());
                    }
                    Some(OrchestratorCommand::ReconnectElapsed(seq)) => {
                        task.reconnect_elapsed(seq).await;
                    }
                    Some(OrchestratorCommand::Shutdown) | None => {
                        task.monitor.shutdown().await;
                        break;
                    }
                }
            }
            outcome = done_rx.recv() => {
                if let Some((result, reply)) = outcome {
                    task.finish_pass(result, reply).await;
                }
            }
        }
    }
}

impl OrchestratorTask {
    /// Track connectivity and arm the reconnect debounce on regain
    async fn apply_connectivity(&mut self, state: ConnectivityState) {
        let was_online = self.status.connectivity.online;
        self.status.connectivity = state;
        let now_online = self.status.connectivity.online;

        if now_online && !was_online {
            self.emit(OrchestratorEvent::Online).await;
            self.reconnect_seq += 1;
            let seq = self.reconnect_seq;
            let command_tx = self.command_tx.clone();
            let debounce = self.reconnect_debounce;
            info!(
                debounce_ms = debounce.as_millis() as u64,
                "connectivity regained, queue replay scheduled"
            );
            tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                let _ = command_tx
                    .send(OrchestratorCommand::ReconnectElapsed(seq))
                    .await;
            });
        } else if !now_online && was_online {
            info!("connectivity lost");
            self.emit(OrchestratorEvent::Offline).await;
            // Invalidate any armed reconnect timer
            self.reconnect_seq += 1;
        }
        self.publish();
    }

    /// A debounce timer fired; sync if it is still the latest one
    async fn reconnect_elapsed(&mut self, seq: u64) {
        if seq != self.reconnect_seq {
            debug!(seq, latest = self.reconnect_seq, "stale reconnect timer ignored");
            return;
        }
        if !self.status.connectivity.online || self.busy {
            return;
        }
        match self.queue.depth() {
            Ok(depth) if depth.pending > 0 => {
                info!(pending = depth.pending, "replaying queue after reconnect");
                self.start_pass(None).await;
            }
            Ok(_) => debug!("queue empty after reconnect"),
            Err(e) => warn!(error = %e, "could not read queue depth after reconnect"),
        }
    }

    async fn force_sync(&mut self, reply: PassReply) {
        if self.busy {
            let _ = reply.send(Err(OrchestratorError::SyncInProgress));
            return;
        }

        // Decide on a fresh probe, not the last heartbeat
        let state = self.monitor.force_check().await;
        self.status.connectivity = state.clone();
        self.publish();

        if state.online {
            self.start_pass(Some(reply)).await;
        } else {
            let _ = reply.send(Err(OrchestratorError::Offline));
        }
    }

    /// Run a sync pass in the background, reporting back on `done_tx`
    async fn start_pass(&mut self, reply: Option<PassReply>) {
        if self.busy {
            if let Some(reply) = reply {
                let _ = reply.send(Err(OrchestratorError::SyncInProgress));
            }
            return;
        }
        self.busy = true;
        self.emit(OrchestratorEvent::SyncStarted).await;

        let synchronizer = self.synchronizer.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = synchronizer.sync_all().await;
            let _ = done_tx.send((result, reply)).await;
        });
    }

    async fn finish_pass(&mut self, result: anyhow::Result<SyncReport>, reply: Option<PassReply>) {
        self.busy = false;
        match result {
            Ok(report) => {
                self.status.last_sync_error = None;
                self.emit(OrchestratorEvent::SyncFinished(report)).await;
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(report));
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(error = %message, "sync pass could not run");
                self.status.last_sync_error = Some(message.clone());
                self.emit(OrchestratorEvent::SyncFailed(message.clone())).await;
                if let Some(reply) = reply {
                    let _ = reply.send(Err(OrchestratorError::Sync(message)));
                }
            }
        }
        self.refresh_depth();
        self.publish();
    }

    fn clear_failed(&mut self) -> Result<usize, OrchestratorError> {
        let purged = self.queue.purge_failed()?;
        if purged > 0 {
            info!(purged, "failed operations cleared");
        }
        self.refresh_depth();
        self.publish();
        Ok(purged)
    }

    fn queue_report(&self) -> Result<QueueReport, OrchestratorError> {
        Ok(QueueReport {
            depth: self.queue.depth()?,
            entries: self.queue.list_all()?,
        })
    }

    /// Periodic depth recompute and cache eviction
    fn housekeeping(&mut self) {
        self.refresh_depth();
        match self.queue.store().cache_evict_expired() {
            Ok(0) => {}
            Ok(evicted) => debug!(evicted, "expired cache entries evicted"),
            Err(e) => warn!(error = %e, "cache eviction failed"),
        }
        self.publish();
    }

    fn refresh_depth(&mut self) {
        match self.queue.depth() {
            Ok(depth) => self.status.depth = depth,
            Err(e) => warn!(error = %e, "could not read queue depth"),
        }
    }

    fn publish(&self) {
        let _ = self.status_tx.send(self.status.clone());
    }

    async fn emit(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event).await;
    }
}
