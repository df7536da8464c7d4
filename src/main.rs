//! respcache - A minimal in-memory RESP cache
//!
//! This is the main entry point for the server. It parses the command line,
//! sets up logging and runs the server until Ctrl+C.

use anyhow::Context;
use respcache::config::{self, Invocation};
use respcache::Server;
use std::sync::atomic::Ordering;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = match config::parse_args(std::env::args().skip(1)) {
        Ok(Invocation::Run(config)) => config,
        Ok(Invocation::Help) => {
            println!("{}", config::help_text());
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("respcache version {}", respcache::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", config::help_text());
            std::process::exit(1);
        }
    };

    // Set up logging
    let filter = match &config.log_level {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter '{}'", directive))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!(version = respcache::VERSION, "Starting respcache");

    let server = Server::bind(&config)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    server.run_until(shutdown).await;

    let storage = server.storage().stats();
    let connections = server.stats();
    info!(
        keys = storage.keys,
        gets = storage.gets,
        sets = storage.sets,
        deletes = storage.deletes,
        expired = storage.expired,
        connections = connections.connections_accepted.load(Ordering::Relaxed),
        commands = connections.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
