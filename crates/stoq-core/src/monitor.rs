//! Connectivity monitor
//!
//! Background heartbeat that probes the API liveness endpoint and
//! publishes [`ConnectivityState`] over a watch channel. Probes run on
//! a fixed interval while the embedder reports itself visible, pause
//! while hidden, and fire immediately on demand.
//!
//! Every probe carries a generation number; only the result of the most
//! recently launched probe is applied, so a slow response can never
//! overwrite the outcome of a newer probe.
//!
//! Platform connectivity signals are advisory: an offline signal flips
//! the state immediately, an online signal flips it optimistically and
//! schedules a confirming probe shortly after.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::config::Config;

/// Delay before the probe that confirms an optimistic online signal
const CONFIRM_PROBE_DELAY: Duration = Duration::from_millis(250);

/// Current connectivity as the monitor sees it
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectivityState {
    /// Whether the API was reachable at the last settled probe
    pub online: bool,
    /// Whether a probe is in flight right now
    pub checking: bool,
    /// When the last probe settled
    pub last_checked: Option<DateTime<Utc>>,
    /// Why the API is considered unreachable, when it is
    pub last_error: Option<String>,
}

/// Commands sent to the monitor task
#[derive(Debug)]
pub enum MonitorCommand {
    /// Probe now and reply with the settled state
    ForceCheck(oneshot::Sender<ConnectivityState>),
    /// Pause (false) or resume (true) the heartbeat
    SetVisible(bool),
    /// Platform reports connectivity regained
    PlatformOnline,
    /// Platform reports connectivity lost
    PlatformOffline,
    /// Internal: run a scheduled confirming probe
    Probe,
    /// Shutdown the monitor task
    Shutdown,
}

/// Handle to control and observe the monitor task
#[derive(Clone)]
pub struct MonitorHandle {
    command_tx: mpsc::Sender<MonitorCommand>,
    status_rx: watch::Receiver<ConnectivityState>,
}

impl MonitorHandle {
    /// Snapshot of the current state
    pub fn state(&self) -> ConnectivityState {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.status_rx.clone()
    }

    /// Probe immediately and wait for the result
    ///
    /// Used right before user-initiated syncs so the decision is based
    /// on fresh information rather than the last heartbeat.
    pub async fn force_check(&self) -> ConnectivityState {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(MonitorCommand::ForceCheck(reply_tx))
            .await
            .is_err()
        {
            return self.state();
        }
        reply_rx.await.unwrap_or_else(|_| self.state())
    }

    /// Report whether the embedding surface is visible
    pub async fn set_visible(&self, visible: bool) {
        let _ = self
            .command_tx
            .send(MonitorCommand::SetVisible(visible))
            .await;
    }

    /// Forward a platform online signal
    pub async fn notify_platform_online(&self) {
        let _ = self.command_tx.send(MonitorCommand::PlatformOnline).await;
    }

    /// Forward a platform offline signal
    pub async fn notify_platform_offline(&self) {
        let _ = self.command_tx.send(MonitorCommand::PlatformOffline).await;
    }

    /// Stop the monitor task
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(MonitorCommand::Shutdown).await;
    }
}

/// Spawn the connectivity monitor task
///
/// The first probe fires immediately; afterwards the heartbeat runs on
/// the configured interval. Without a configured `api_url` every probe
/// settles offline with an explanatory error.
pub fn spawn_monitor(config: &Config, client: reqwest::Client) -> MonitorHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (status_tx, status_rx) = watch::channel(ConnectivityState::default());
    let (result_tx, result_rx) = mpsc::channel(16);

    let probe_url = config.api_url.as_ref().map(|base| {
        format!("{}{}", base.trim_end_matches('/'), config.health_path)
    });

    let task = MonitorTask {
        client,
        probe_url,
        probe_timeout: config.probe_timeout(),
        visible: true,
        probe_seq: 0,
        state: ConnectivityState::default(),
        status_tx,
        result_tx,
        command_tx: command_tx.clone(),
        pending_replies: Vec::new(),
    };

    tokio::spawn(monitor_task_loop(
        task,
        config.probe_interval(),
        command_rx,
        result_rx,
    ));

    MonitorHandle {
        command_tx,
        status_rx,
    }
}

struct MonitorTask {
    client: reqwest::Client,
    probe_url: Option<String>,
    probe_timeout: Duration,
    visible: bool,
    /// Generation of the most recently launched probe
    probe_seq: u64,
    state: ConnectivityState,
    status_tx: watch::Sender<ConnectivityState>,
    result_tx: mpsc::Sender<(u64, Result<(), String>)>,
    command_tx: mpsc::Sender<MonitorCommand>,
    /// Force-check callers waiting for the next settled probe
    pending_replies: Vec<oneshot::Sender<ConnectivityState>>,
}

async fn monitor_task_loop(
    mut task: MonitorTask,
    probe_interval: Duration,
    mut command_rx: mpsc::Receiver<MonitorCommand>,
    mut result_rx: mpsc::Receiver<(u64, Result<(), String>)>,
) {
    let mut ticker = tokio::time::interval(probe_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if task.visible {
                    task.launch_probe();
                }
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(MonitorCommand::ForceCheck(reply)) => {
                        task.pending_replies.push(reply);
                        task.launch_probe();
                    }
                    Some(MonitorCommand::SetVisible(visible)) => {
                        let regained = visible && !task.visible;
                        task.visible = visible;
                        if regained {
                            task.launch_probe();
                        }
                    }
                    Some(MonitorCommand::PlatformOnline) => {
                        task.apply_platform_online();
                    }
                    Some(MonitorCommand::PlatformOffline) => {
                        task.apply_platform_offline();
                    }
                    Some(MonitorCommand::Probe) => {
                        task.launch_probe();
                    }
                    Some(MonitorCommand::Shutdown) | None => break,
                }
            }
            result = result_rx.recv() => {
                if let Some((seq, outcome)) = result {
                    task.apply_result(seq, outcome);
                }
            }
        }
    }
}

impl MonitorTask {
    /// Start a new probe, superseding any still in flight
    fn launch_probe(&mut self) {
        self.probe_seq += 1;
        let seq = self.probe_seq;

        let Some(url) = self.probe_url.clone() else {
            self.apply_result(seq, Err("api_url is not configured".to_string()));
            return;
        };

        self.state.checking = true;
        self.publish();

        let client = self.client.clone();
        let timeout = self.probe_timeout;
        let result_tx = self.result_tx.clone();
        tokio::spawn(async move {
            let outcome = probe_once(&client, &url, timeout).await;
            let _ = result_tx.send((seq, outcome)).await;
        });
    }

    /// Apply a settled probe, unless a newer probe has been launched
    fn apply_result(&mut self, seq: u64, outcome: Result<(), String>) {
        if seq != self.probe_seq {
            debug!(seq, latest = self.probe_seq, "stale probe result discarded");
            return;
        }

        let was_online = self.state.online;
        self.state.checking = false;
        self.state.last_checked = Some(Utc::now());
        match outcome {
            Ok(()) => {
                self.state.online = true;
                self.state.last_error = None;
            }
            Err(e) => {
                self.state.online = false;
                self.state.last_error = Some(e);
            }
        }

        if was_online != self.state.online {
            info!(online = self.state.online, "connectivity changed");
        }
        self.publish();

        let settled = self.state.clone();
        for reply in self.pending_replies.drain(..) {
            let _ = reply.send(settled.clone());
        }
    }

    fn apply_platform_online(&mut self) {
        info!("platform reported online, confirming with probe");
        self.state.online = true;
        self.state.last_error = None;
        self.publish();

        // Confirm shortly after; the platform signal is only a hint
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CONFIRM_PROBE_DELAY).await;
            let _ = command_tx.send(MonitorCommand::Probe).await;
        });
    }

    fn apply_platform_offline(&mut self) {
        info!("platform reported offline");
        self.state.online = false;
        self.state.last_error = Some("platform reported offline".to_string());
        self.publish();
    }

    fn publish(&self) {
        let _ = self.status_tx.send(self.state.clone());
    }
}

/// One probe attempt; any 2xx means reachable
async fn probe_once(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<(), String> {
    match client.get(url).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => Ok(()),
        Ok(response) => Err(format!("liveness endpoint returned {}", response.status())),
        Err(e) => Err(format!("liveness probe failed: {e}")),
    }
}
