//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use stoq_core::{OfflineStatus, QueueDepth, QueueEntry, SyncReport};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print the combined connectivity and queue status
    pub fn print_status(&self, status: &OfflineStatus) {
        match self.format {
            OutputFormat::Human => {
                println!("STOQ Status");
                println!("===========");
                println!();
                println!("Connectivity:");
                println!(
                    "  State:   {}",
                    if status.connectivity.online {
                        "online".to_string()
                    } else {
                        match &status.connectivity.last_error {
                            Some(reason) => format!("offline ({})", reason),
                            None => "offline".to_string(),
                        }
                    }
                );
                if let Some(checked) = status.connectivity.last_checked {
                    println!("  Checked: {}", checked.format("%Y-%m-%d %H:%M:%S"));
                }
                println!();
                println!("Queue:");
                println!("  Pending: {}", status.depth.pending);
                println!("  Syncing: {}", status.depth.syncing);
                println!("  Failed:  {}", status.depth.failed);
                println!();
                println!("Storage:");
                println!(
                    "  Persistent: {}",
                    if status.storage_persistent { "yes" } else { "no (in-memory)" }
                );
                if let Some(ref error) = status.last_sync_error {
                    println!();
                    println!("Last sync error: {}", error);
                }
                println!();
                println!(
                    "Health: {}",
                    if status.is_healthy() {
                        "ok"
                    } else {
                        "attention needed"
                    }
                );
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(status).unwrap());
            }
            OutputFormat::Quiet => {
                println!(
                    "{}",
                    if status.connectivity.online {
                        "online"
                    } else {
                        "offline"
                    }
                );
            }
        }
    }

    /// Print the queue contents in replay order
    pub fn print_queue(&self, entries: &[QueueEntry], depth: &QueueDepth) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("No operations found.");
                    return;
                }
                for entry in entries {
                    println!(
                        "{} | {:<12} | {:<7} | {} retries | {}",
                        entry.id,
                        entry.kind,
                        entry.status,
                        entry.retry_count,
                        entry.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
                    );
                    if let Some(ref error) = entry.last_error {
                        println!("    last error: {}", truncate(error, 70));
                    }
                }
                println!("\n{}", depth);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(entries).unwrap());
            }
            OutputFormat::Quiet => {
                for entry in entries {
                    println!("{}", entry.id);
                }
            }
        }
    }

    /// Print the outcome of a sync pass
    pub fn print_report(&self, report: &SyncReport) {
        match self.format {
            OutputFormat::Human => {
                if report.total == 0 {
                    println!("Queue is empty - nothing to sync.");
                } else if report.is_clean() {
                    println!("✓ Sync complete - {}", report);
                } else {
                    println!("Sync finished with failures - {}", report);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(report).unwrap());
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a captured-operation confirmation
    pub fn captured(&self, what: &str, id: &str) {
        match self.format {
            OutputFormat::Human => {
                println!("✓ {} captured ({})", what, id);
                println!("It will sync automatically once the API is reachable.");
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "captured", "operation": what, "id": id})
                );
            }
            OutputFormat::Quiet => {
                println!("{}", id);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Truncate a string to at most `max_len` bytes, adding "..." if truncated
///
/// The cut lands on a char boundary, so multi-byte text is never split
/// mid-character.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut cut = max_len.saturating_sub(3);
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}
