//! Status command handler

use anyhow::Result;

use stoq_core::monitor::spawn_monitor;
use stoq_core::{Config, OfflineStatus, OperationQueue};

use crate::output::Output;

/// Show connectivity, queue depth, and storage health
///
/// Probes the API once so the connectivity shown is current, not the
/// result of an old heartbeat.
pub async fn show(config: &Config, queue: &OperationQueue, output: &Output) -> Result<()> {
    let client = reqwest::Client::builder().build()?;
    let monitor = spawn_monitor(config, client);
    let connectivity = monitor.force_check().await;
    monitor.shutdown().await;

    let status = OfflineStatus {
        connectivity,
        depth: queue.depth()?,
        last_sync_error: None,
        storage_persistent: queue.is_persistent(),
    };

    output.print_status(&status);
    Ok(())
}
