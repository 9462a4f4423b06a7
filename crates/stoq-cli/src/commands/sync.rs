//! Sync command handler

use anyhow::{bail, Result};

use stoq_core::monitor::spawn_monitor;
use stoq_core::orchestrator::{spawn_orchestrator, OrchestratorError};
use stoq_core::sync::{AuthToken, Synchronizer};
use stoq_core::{Config, OperationQueue};

use crate::output::Output;

/// Probe connectivity and replay the queue now
pub async fn run(config: &Config, queue: OperationQueue, output: &Output) -> Result<()> {
    if config.api_url.is_none() {
        bail!(
            "API URL not configured. Set it with:\n  \
             stoq config set api_url https://your-server"
        );
    }

    // One-shot run; the orchestrator must not start its own pass
    let config = Config {
        sync_on_start: false,
        ..config.clone()
    };

    let client = reqwest::Client::builder().build()?;
    let monitor = spawn_monitor(&config, client);
    let token = AuthToken::new(config.auth_token.clone());
    let synchronizer = Synchronizer::new(&config, queue.clone(), token)?;
    let handle = spawn_orchestrator(&config, queue, monitor, synchronizer)?;

    output.message("Checking connectivity...");
    let result = handle.force_sync().await;
    handle.shutdown().await;

    match result {
        Ok(report) => {
            output.print_report(&report);
            if report.failed > 0 {
                bail!("{} operation(s) failed to sync", report.failed);
            }
            Ok(())
        }
        Err(OrchestratorError::Offline) => {
            bail!("Cannot sync while offline. Check your connection and try again.")
        }
        Err(e) => Err(e.into()),
    }
}
