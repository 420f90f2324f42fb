//! TodoKV Admin CLI
//!
//! Offline maintenance of a storage file. Run it while the server is
//! stopped; the file lock makes it fail otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use todokv::wal::WalRecovery;
use todokv::{Config, Database, TodoRepository};
use tracing_subscriber::{fmt, EnvFilter};

/// TodoKV Admin
#[derive(Parser, Debug)]
#[command(name = "todokv-admin")]
#[command(about = "Inspect and maintain a TodoKV storage file")]
#[command(version)]
struct Args {
    /// Storage file
    #[arg(short, long, env = "Storage", default_value = "todos.db")]
    storage: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every todo as one JSON line
    List,

    /// Print a single todo
    Get {
        /// The todo id
        id: u64,
    },

    /// Check the file without modifying it
    Verify,

    /// Rewrite the file as a single commit frame
    Compact,

    /// Show buckets, sequences and file size
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();

    if let Err(e) = execute(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn execute(args: &Args) -> todokv::Result<()> {
    // Verify reads the file directly and takes no lock
    if let Commands::Verify = args.command {
        let report = WalRecovery::verify(&args.storage)?;
        println!("commits:        {}", report.commits_recovered);
        println!("last txid:      {}", report.last_txid);
        println!("valid length:   {}", report.valid_len);
        println!("torn tail:      {}", if report.was_truncated { "yes" } else { "no" });
        return Ok(());
    }

    let config = Config::builder()
        .storage_path(&args.storage)
        // Never compact implicitly from the admin tool
        .compaction_threshold(u64::MAX)
        .build();
    // A mistyped path must not create a new store
    let db = Arc::new(Database::open_existing(config)?);

    match args.command {
        Commands::List => {
            let repo = TodoRepository::attach(Arc::clone(&db));
            for todo in repo.list()? {
                println!("{}", serde_json::to_string(&todo)?);
            }
        }
        Commands::Get { id } => {
            let repo = TodoRepository::attach(Arc::clone(&db));
            println!("{}", serde_json::to_string_pretty(&repo.get(id)?)?);
        }
        Commands::Compact => {
            let stats = db.compact()?;
            println!("{} -> {} bytes", stats.bytes_before, stats.bytes_after);
        }
        Commands::Stats => {
            let stats = db.stats();
            println!("txid:      {}", stats.txid);
            println!("file size: {} bytes", stats.file_size);
            for bucket in &stats.buckets {
                println!(
                    "bucket {:<12} entries={} sequence={} bytes={}",
                    bucket.name, bucket.entries, bucket.sequence, bucket.size
                );
            }
        }
        Commands::Verify => {}
    }

    Ok(())
}
