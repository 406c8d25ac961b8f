//! PulseKV - An In-Memory Key-Value Server
//!
//! Entry point: parses flags, starts the expiry sweeper on the Tokio runtime
//! and runs the connection reactor on a blocking thread until Ctrl+C.

use clap::Parser;
use pulsekv::config::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use pulsekv::connection::Server;
use pulsekv::storage::{start_expiry_sweeper, Store};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// PulseKV server
#[derive(Parser, Debug)]
#[command(name = "pulsekv")]
#[command(about = "In-memory key-value server speaking RESP")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum concurrent client connections
    #[arg(long, default_value_t = ServerConfig::default().max_connections)]
    max_connections: usize,

    /// Per-connection buffer limit in bytes
    #[arg(long, default_value_t = ServerConfig::default().max_buffer_size)]
    max_buffer_size: usize,
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
PulseKV v{} - In-Memory Key-Value Server
──────────────────────────────────────────
Listening on {}
Max connections: {}

Use Ctrl+C to shutdown gracefully.
"#,
        pulsekv::VERSION,
        config.bind_address(),
        config.max_connections
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let config = ServerConfig::builder()
        .host(args.host)
        .port(args.port)
        .max_connections(args.max_connections)
        .max_buffer_size(args.max_buffer_size)
        .build();

    // Shared between the reactor and the sweeper
    let store = Arc::new(Store::new());
    info!(shards = store.shard_count(), "Store initialized");

    let sweeper = start_expiry_sweeper(Arc::clone(&store));

    let server = Server::bind(config.clone(), store)?;
    print_banner(&config);

    let handle = server.shutdown_handle();
    let mut reactor = tokio::task::spawn_blocking(move || server.run());

    tokio::select! {
        result = &mut reactor => {
            // The reactor only returns early if polling itself failed
            result??;
        }
        result = signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, stopping server...");
            handle.shutdown();
            reactor.await??;
        }
    }

    sweeper.stop();
    info!("Server shutdown complete");
    Ok(())
}
