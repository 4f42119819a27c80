//! tally-server — counter aggregation and rollup daemon.
//!
//! Accepts line-delimited JSON RPCs (ingestion, catalogue listing, series
//! queries) over TCP, accumulates counters in memory, and runs the
//! once-per-minute maintenance pass (flush, rollup, retention) against
//! the backing store on a dedicated timer thread.
//!
//! Requests and the maintenance tick all serialize through one mutex, so
//! a tick never interleaves with another tick or with ingestion.

mod rpc;

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::Parser;
use tally::store::MetricStore;
use tally::{Health, MemoryStore, Monitor, RedisStore, time};

/// tally-server — counter aggregation and rollup daemon.
#[derive(Parser)]
#[command(name = "tally-server", version, about)]
struct Cli {
    /// Address to listen on for RPC connections.
    #[arg(long, default_value = "0.0.0.0:7117")]
    listen: String,

    /// Redis URL of the backing store.
    #[arg(long, default_value = "redis://127.0.0.1:6379/0")]
    store_url: String,

    /// Store connect and round-trip timeout, in seconds.
    #[arg(long, default_value = "5")]
    store_timeout: u64,

    /// Run against a transient in-memory store instead of Redis
    /// (development only; nothing survives a restart).
    #[arg(long)]
    memory: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = if cli.memory {
        tracing::warn!("using an in-memory store; counters will not survive a restart");
        run(MemoryStore::new(), &cli.listen)
    } else {
        match RedisStore::connect(&cli.store_url, Duration::from_secs(cli.store_timeout)) {
            Ok(store) => run(store, &cli.listen),
            Err(err) => Err(err.into()),
        }
    };

    if let Err(err) = result {
        tracing::error!("server failed: {err}");
        std::process::exit(1);
    }
}

/// Builds the monitor, starts the maintenance timer, and serves
/// connections until the listener dies.
fn run<S>(store: S, listen: &str) -> Result<(), Box<dyn std::error::Error>>
where
    S: MetricStore + Send + 'static,
{
    let monitor = Arc::new(Mutex::new(Monitor::new(store, time::now())?));

    let maintenance = Arc::clone(&monitor);
    thread::spawn(move || maintenance_loop(&maintenance));

    let listener = TcpListener::bind(listen)?;
    tracing::info!(%listen, "listening");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || rpc::serve_connection(stream, &monitor));
            }
            Err(err) => tracing::warn!("accept error: {err}"),
        }
    }

    Ok(())
}

/// Ticks the scheduler once a second. The scheduler itself decides when a
/// pass is due; this loop only supplies the clock and turns a `Fatal`
/// report into process exit.
fn maintenance_loop<S: MetricStore>(monitor: &Arc<Mutex<Monitor<S>>>) {
    loop {
        thread::sleep(Duration::from_secs(1));

        let health = match monitor.lock() {
            Ok(mut monitor) => monitor.tick(time::now()),
            Err(_) => {
                tracing::error!("monitor lock poisoned, aborting");
                std::process::exit(1);
            }
        };

        if let Health::Fatal { since } = health {
            tracing::error!(
                failing_since = since,
                "store unreachable past the fatal threshold, aborting"
            );
            std::process::exit(1);
        }
    }
}
