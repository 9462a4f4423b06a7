//! Watch command handler
//!
//! Runs the full offline stack in the foreground: heartbeat probing,
//! reconnect-triggered replay, and housekeeping. Prints sync activity
//! until interrupted with Ctrl-C.

use anyhow::Result;

use stoq_core::monitor::spawn_monitor;
use stoq_core::orchestrator::{spawn_orchestrator, OrchestratorEvent};
use stoq_core::sync::{AuthToken, Synchronizer};
use stoq_core::{Config, OperationQueue};

use crate::output::Output;

pub async fn run(config: &Config, queue: OperationQueue, output: &Output) -> Result<()> {
    let client = reqwest::Client::builder().build()?;
    let monitor = spawn_monitor(config, client);
    let token = AuthToken::new(config.auth_token.clone());
    let synchronizer = Synchronizer::new(config, queue.clone(), token)?;
    let mut handle = spawn_orchestrator(config, queue, monitor, synchronizer)?;
    let mut events = handle.take_events().unwrap();

    let depth = handle.status().depth;
    output.message(&format!(
        "Watching the queue ({} pending). Press Ctrl-C to stop.",
        depth.pending
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                match event {
                    Some(event) => print_event(&event, output),
                    None => break,
                }
            }
        }
    }

    output.message("Stopping...");
    handle.shutdown().await;
    Ok(())
}

fn print_event(event: &OrchestratorEvent, output: &Output) {
    match event {
        OrchestratorEvent::Online => output.message("Connectivity regained"),
        OrchestratorEvent::Offline => output.message("Connectivity lost"),
        OrchestratorEvent::SyncStarted => output.message("Sync started..."),
        OrchestratorEvent::SyncFinished(report) => {
            output.message(&format!("Sync finished: {}", report));
        }
        OrchestratorEvent::SyncFailed(error) => {
            output.message(&format!("Sync failed: {}", error));
        }
    }
}
