//! Queue command handlers

use anyhow::Result;

use stoq_core::{EntryStatus, OperationQueue};

use crate::output::Output;

/// List queued operations in replay order
pub fn list(queue: &OperationQueue, failed_only: bool, output: &Output) -> Result<()> {
    let mut entries = queue.list_all()?;
    if failed_only {
        entries.retain(|e| e.status == EntryStatus::Failed);
    }
    let depth = queue.depth()?;
    output.print_queue(&entries, &depth);
    Ok(())
}

/// Remove operations that exhausted their retries
pub fn purge_failed(queue: &OperationQueue, output: &Output) -> Result<()> {
    let purged = queue.purge_failed()?;
    if purged == 0 {
        output.message("No failed operations to remove.");
    } else {
        output.success(&format!("Removed {} failed operation(s)", purged));
    }
    Ok(())
}
