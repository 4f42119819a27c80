//! CLI for the tally aggregation service.
//!
//! Catalogue and series commands speak the server's line-delimited JSON
//! RPC protocol; `delete-scope` goes straight to the backing store, the
//! same way an operator would retire a namespace out-of-band.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tally::RedisStore;
use tally::proto::{Reply, Request, method};

/// Default server address for RPC commands.
const DEFAULT_SERVER: &str = "127.0.0.1:7117";

/// tally — operator CLI for the aggregation service.
#[derive(Parser)]
#[command(name = "tally", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List all known scopes.
    Scopes {
        /// Server address.
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },

    /// List keys registered under a scope.
    Keys {
        /// Scope to list.
        scope: String,

        /// Server address.
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },

    /// List hosts registered under a scope and key.
    Hosts {
        /// Scope of the key.
        scope: String,

        /// Key to list.
        key: String,

        /// Server address.
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },

    /// Query a minute-resolution series.
    Query {
        /// Scope of the series.
        scope: String,

        /// Key of the series.
        key: String,

        /// Host of the series; empty selects the cross-host aggregate.
        #[arg(long, default_value = "")]
        host: String,

        /// Number of minute points, ending at the last closed minute.
        #[arg(long, default_value = "60")]
        count: u64,

        /// Server address.
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Query a daily-resolution series.
    Daily {
        /// Scope of the series.
        scope: String,

        /// Key of the series.
        key: String,

        /// Host of the series; empty selects the cross-host aggregate.
        #[arg(long, default_value = "")]
        host: String,

        /// Number of daily points, ending at the last closed day.
        #[arg(long, default_value = "7")]
        count: u64,

        /// Server address.
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Delete every stored series and index entry for a scope.
    /// Talks to the backing store directly, not to the server.
    DeleteScope {
        /// Scope to delete.
        scope: String,

        /// Redis URL of the backing store.
        #[arg(long, default_value = "redis://127.0.0.1:6379/0")]
        store_url: String,
    },
}

/// Output format for series queries.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of `[timestamp, value]` pairs.
    Json,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scopes { server } => cmd_list(&server, method::LIST_SCOPE, vec![]),
        Commands::Keys { scope, server } => {
            cmd_list(&server, method::LIST_KEY, vec![scope.into()])
        }
        Commands::Hosts { scope, key, server } => {
            cmd_list(&server, method::LIST_HOST, vec![scope.into(), key.into()])
        }
        Commands::Query {
            scope,
            key,
            host,
            count,
            server,
            format,
        } => cmd_series(&server, method::QUERY, &scope, &key, &host, count, &format),
        Commands::Daily {
            scope,
            key,
            host,
            count,
            server,
            format,
        } => cmd_series(&server, method::DAILY, &scope, &key, &host, count, &format),
        Commands::DeleteScope { scope, store_url } => cmd_delete_scope(&scope, &store_url),
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

/// Sends one request and reads one reply line back.
fn call(server: &str, method: &str, params: Vec<serde_json::Value>) -> Result<Reply, Box<dyn std::error::Error>> {
    let stream = TcpStream::connect(server)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    let request = Request {
        id: 1,
        method: method.to_string(),
        params,
    };
    let mut writer = stream.try_clone()?;
    writeln!(writer, "{}", serde_json::to_string(&request)?)?;

    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line)?;
    if line.is_empty() {
        return Err("server closed the connection without replying".into());
    }

    let reply: Reply = serde_json::from_str(&line)?;
    if let Some(rpc_err) = &reply.error {
        return Err(format!("server error {}: {}", rpc_err.code, rpc_err.message).into());
    }
    Ok(reply)
}

/// Implements the catalogue listing commands.
fn cmd_list(
    server: &str,
    method: &str,
    params: Vec<serde_json::Value>,
) -> Result<(), Box<dyn std::error::Error>> {
    let reply = call(server, method, params)?;
    let names = reply
        .result
        .as_array()
        .ok_or("malformed reply: expected an array")?;
    for name in names {
        println!("{}", name.as_str().unwrap_or_default());
    }
    Ok(())
}

/// Implements `tally query` and `tally daily`.
fn cmd_series(
    server: &str,
    method: &str,
    scope: &str,
    key: &str,
    host: &str,
    count: u64,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = vec![
        scope.into(),
        key.into(),
        host.into(),
        serde_json::Value::from(count),
    ];
    let reply = call(server, method, params)?;
    let points = reply
        .result
        .as_array()
        .ok_or("malformed reply: expected an array")?;

    match format {
        OutputFormat::Csv => {
            let series_host = if host.is_empty() { "<all>" } else { host };
            println!("# series={scope}:{key}:{series_host}, points={}", points.len());
            println!("timestamp,value");
            for point in points {
                let ts = point.get(0).and_then(serde_json::Value::as_u64).unwrap_or(0);
                let value = point.get(1).and_then(serde_json::Value::as_u64).unwrap_or(0);
                println!("{ts},{value}");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reply.result)?);
        }
    }
    Ok(())
}

/// Implements `tally delete-scope`.
fn cmd_delete_scope(scope: &str, store_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = RedisStore::connect(store_url, Duration::from_secs(10))?;
    let deleted = tally::admin::delete_scope(&mut store, scope)?;
    println!("Deleted scope '{scope}' ({deleted} series keys removed)");
    Ok(())
}
