//! STOQ CLI
//!
//! Command-line interface for STOQ - offline-first operation capture and sync.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use stoq_core::{Config, DurableStore, OperationQueue};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "stoq")]
#[command(about = "STOQ - Offline-first operation capture and sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show connectivity, queue depth, and storage health
    Status,
    /// Probe connectivity and replay the queue now
    Sync,
    /// Inspect and maintain the operation queue
    Queue {
        #[command(subcommand)]
        command: Option<QueueCommands>,
    },
    /// Capture an operation, online or not
    Add {
        #[command(subcommand)]
        command: AddCommands,
    },
    /// Run in the foreground, syncing as connectivity allows
    Watch,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum QueueCommands {
    /// List queued operations in replay order
    #[command(alias = "ls")]
    List {
        /// Show only operations that exhausted their retries
        #[arg(long)]
        failed: bool,
    },
    /// Remove operations that exhausted their retries
    PurgeFailed,
}

#[derive(Subcommand)]
enum AddCommands {
    /// Record a product sale
    Sale {
        /// Product identifier
        #[arg(long)]
        product: String,
        /// Units sold
        #[arg(long)]
        quantity: u32,
        /// Unit price at the time of sale
        #[arg(long)]
        price: Option<f64>,
    },
    /// Record a stock withdrawal
    Withdrawal {
        /// Product identifier
        #[arg(long)]
        product: String,
        /// Units withdrawn
        #[arg(long)]
        quantity: u32,
        /// Reason for the withdrawal
        #[arg(long)]
        reason: Option<String>,
    },
    /// Record a new product
    Product {
        /// Product name
        #[arg(long)]
        name: String,
        /// Initial stock
        #[arg(long)]
        quantity: u32,
        /// Unit price
        #[arg(long)]
        price: f64,
        /// Product category
        #[arg(long)]
        category: Option<String>,
    },
    /// Record a service sale
    Service {
        /// Service description
        #[arg(long)]
        description: String,
        /// Service price
        #[arg(long)]
        price: f64,
        /// Customer name
        #[arg(long)]
        customer: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, api_url, auth_token, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the queue
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(&output),
            Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, &output),
        };
    }

    init_logging();
    let config = Config::load()?;

    // Open the queue, degrading to in-memory storage when the disk
    // cannot be used
    let store = Arc::new(DurableStore::open_or_fallback(&config)?);
    let queue = OperationQueue::new(store);
    if !queue.is_persistent() && !output.is_quiet() {
        eprintln!("Warning: durable storage unavailable; operations will not survive a restart");
    }

    match cli.command {
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Status => commands::status::show(&config, &queue, &output).await,
        Commands::Sync => commands::sync::run(&config, queue, &output).await,
        Commands::Queue { command } => match command {
            Some(QueueCommands::PurgeFailed) => commands::queue::purge_failed(&queue, &output),
            Some(QueueCommands::List { failed }) => commands::queue::list(&queue, failed, &output),
            None => commands::queue::list(&queue, false, &output),
        },
        Commands::Add { command } => handle_add_command(command, &queue, &output),
        Commands::Watch => commands::watch::run(&config, queue, &output).await,
    }
}

fn handle_add_command(command: AddCommands, queue: &OperationQueue, output: &Output) -> Result<()> {
    match command {
        AddCommands::Sale {
            product,
            quantity,
            price,
        } => commands::add::sale(queue, product, quantity, price, output),
        AddCommands::Withdrawal {
            product,
            quantity,
            reason,
        } => commands::add::withdrawal(queue, product, quantity, reason, output),
        AddCommands::Product {
            name,
            quantity,
            price,
            category,
        } => commands::add::product(queue, name, quantity, price, category, output),
        AddCommands::Service {
            description,
            price,
            customer,
        } => commands::add::service(queue, description, price, customer, output),
    }
}

/// Initialize logging to stderr
///
/// Only initializes if the STOQ_LOG environment variable is set.
fn init_logging() {
    let Ok(log_level) = std::env::var("STOQ_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!("stoq_core={},stoq={}", log_level, log_level));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
