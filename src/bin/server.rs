//! TodoKV Server Binary
//!
//! Starts the HTTP server for the Todo service.

use std::sync::Arc;

use clap::Parser;
use todokv::{Config, Database, Dispatcher, Metrics, Server, TodoRepository};
use tracing_subscriber::{fmt, EnvFilter};

/// TodoKV Server
#[derive(Parser, Debug)]
#[command(name = "todokv-server")]
#[command(about = "Todo list HTTP service over an embedded key-value store")]
#[command(version)]
struct Args {
    /// Storage file
    #[arg(short, long, env = "Storage", default_value = "todos.db")]
    storage: String,

    /// Listen port
    #[arg(short, long, env = "listenPort", default_value = "8080")]
    port: u16,

    /// Listen host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Worker threads handling requests
    #[arg(short, long, default_value = "8")]
    workers: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,todokv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("TodoKV Server v{}", todokv::VERSION);
    tracing::info!("Storage file: {}", args.storage);

    // Build config from args
    let config = Config::builder()
        .storage_path(&args.storage)
        .listen_addr(format!("{}:{}", args.host, args.port))
        .worker_threads(args.workers)
        .build();

    if let Err(e) = run(config) {
        tracing::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

fn run(config: Config) -> todokv::Result<()> {
    config.validate()?;

    // Open the store and the todos bucket; failing either is fatal
    let db = Arc::new(Database::open(config.clone())?);
    let repo = TodoRepository::open(Arc::clone(&db))?;
    tracing::info!("Storage initialized successfully");

    let dispatcher = Arc::new(Dispatcher::new(repo, Arc::new(Metrics::new())));
    let server = Server::bind(config, dispatcher)?;

    // Set up Ctrl+C handler
    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        shutdown.shutdown();
    })
    .map_err(|e| todokv::TodoKvError::Config(format!("cannot install signal handler: {}", e)))?;

    server.run()?;

    db.sync()?;
    tracing::info!("Storage synced, exiting");
    Ok(())
}
