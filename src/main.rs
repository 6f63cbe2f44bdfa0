//! ws-bridge: handle-keyed WebSocket multiplexer
//!
//! Applications connect to `/ws` and drive any number of upstream WebSocket
//! connections through one socket, using `[handle, kind, data]` frames:
//! `open`, `transmit` and `close` in; `connected`, `message`, `error` and
//! `disconnected` out.
//!
//! Usage:
//!   ws-bridge                                   # Default port 7071
//!   ws-bridge --port 9000 --trace-sockets       # Log every command and callback
//!   ws-bridge --deny-insecure --allow-host feed.example.com

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use wsb_session::SessionConfig;
use wsb_socket::{ConnectPolicy, WebSocketConnector};
use wsb_transport::{TransportConfig, TransportServer};

#[derive(Parser, Debug)]
#[command(name = "ws-bridge", about = "ws-bridge: handle-keyed WebSocket multiplexer")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7071")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent application clients (0 for no limit)
    #[arg(long, default_value = "32")]
    max_connections: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Log every command and upstream callback with its handle
    #[arg(long)]
    trace_sockets: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Write logs to a file (defaults to ~/.ws-bridge/logs/bridge.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,

    /// Refuse plain ws:// upstreams
    #[arg(long)]
    deny_insecure: bool,

    /// Only allow upstreams on this host (repeatable)
    #[arg(long = "allow-host")]
    allow_host: Vec<String>,

    /// Never dial this upstream port (repeatable)
    #[arg(long = "block-port")]
    block_port: Vec<u16>,

    /// Upstream connect timeout in milliseconds
    #[arg(long, default_value = "10000")]
    connect_timeout_ms: u64,

    /// Events buffered per client before a stalled client is dropped
    #[arg(long, default_value_t = wsb_session::DEFAULT_EVENT_CAPACITY)]
    event_capacity: usize,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.trace_sockets {
        filter = filter.add_directive(
            format!("{}=info", wsb_session::debug::TRACE_TARGET).parse()?,
        );
    }

    let (writer, ansi) = match cli.log_file.as_deref() {
        Some(arg) => {
            let log_path = if arg == "DEFAULT" {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
                PathBuf::from(home).join(".ws-bridge/logs/bridge.log")
            } else {
                PathBuf::from(arg)
            };
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("failed to open log file {}", log_path.display()))?;

            eprintln!("Logging to {}", log_path.display());
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let policy = ConnectPolicy {
        allow_insecure: !cli.deny_insecure,
        allowed_hosts: cli.allow_host.clone(),
        blocked_ports: cli.block_port.clone(),
    };
    let connector = WebSocketConnector::new(policy)
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms));

    let config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        max_connections: (cli.max_connections > 0).then_some(cli.max_connections),
        session: SessionConfig {
            debug: cli.trace_sockets,
            event_capacity: cli.event_capacity,
        },
        verbose_logging: cli.verbose,
    };

    let mut transport = TransportServer::start(config, Arc::new(connector))
        .await
        .context("failed to start transport server")?;

    println!();
    println!("  ws-bridge {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  WebSocket endpoint:");
    println!("    ws://{}:{}/ws", cli.hostname, transport.port());
    println!("  Health:");
    println!("    http://{}:{}/health", cli.hostname, transport.port());
    println!();
    if cli.deny_insecure {
        println!("  Upstreams:  wss:// only");
    }
    if !cli.allow_host.is_empty() {
        println!("  Hosts:      {}", cli.allow_host.join(", "));
    }
    if cli.trace_sockets {
        println!("  Tracing:    every command and callback");
    }
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("Shutting down ({} client(s) connected)", transport.client_count());
    transport.stop().await;
    println!("  Server stopped.");
    Ok(())
}
