//! Forgeloop CLI — the main entry point.
//!
//! Commands:
//! - `enqueue`  — Add a task to the durable queue
//! - `worker`   — Run the worker loop until interrupted
//! - `guardian` — Supervise a worker process, restarting on crash
//! - `status`   — Show queue status
//!
//! Process contract: exit code 0 is a clean shutdown, anything non-zero
//! is a crash. That exit code is the only signal the guardian consumes.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "forgeloop",
    about = "Forgeloop — autonomous task execution runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "forgeloop.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task to the durable queue
    Enqueue {
        /// The instruction to execute
        #[arg(short, long)]
        instruction: String,

        /// Priority; lower value is served first
        #[arg(short, long, default_value_t = 100)]
        priority: i64,
    },

    /// Run the worker loop until interrupted
    Worker,

    /// Supervise a worker process, restarting on crash and rolling back
    /// after repeated failures
    Guardian {
        /// Override the worker command (defaults to `forgeloop worker`)
        #[arg(trailing_var_arg = true)]
        worker_command: Vec<String>,
    },

    /// Show queue status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = forgeloop_config::AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Enqueue {
            instruction,
            priority,
        } => commands::enqueue::run(&config, instruction, priority).await?,
        Commands::Worker => commands::worker::run(&config).await?,
        Commands::Guardian { worker_command } => {
            commands::guardian::run(&config, worker_command).await?
        }
        Commands::Status => commands::status::run(&config).await?,
    }

    Ok(())
}
