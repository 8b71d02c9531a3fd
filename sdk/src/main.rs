//! margindash-ship - pipe usage events to MarginDash
//!
//! Reads newline-delimited JSON `EventPayload`s from stdin and ships them.
//! Remaining events are delivered on EOF, Ctrl+C or SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! # Dry run: print wire events instead of sending them
//! cat events.ndjson | margindash-ship
//!
//! # Ship for real
//! MARGINDASH_API_KEY=md_live_... margindash-ship < events.ndjson
//! ```
//!
//! ## Environment Variables
//!
//! - `MARGINDASH_API_KEY`: API key; without it events go to stdout
//! - `MARGINDASH_BASE_URL`: Collector URL (default: "https://app.margindash.com/api/v1")
//! - `MARGINDASH_FLUSH_INTERVAL_MS`: Flush interval (default: 5000)
//! - `MARGINDASH_MAX_QUEUE_SIZE`: Buffer capacity (default: 1000)
//! - `MARGINDASH_BATCH_SIZE`: Events per request (default: 25)
//! - `MARGINDASH_MAX_RETRIES`: Attempts per batch (default: 3)
//! - `MARGINDASH_LOG_LEVEL`: Log level (default: "info")
//! - `MARGINDASH_LOG_FORMAT`: "pretty" or "json" (default: "pretty")

use margindash::config::{Config, LogFormat};
use margindash::delivery::LogReporter;
use margindash::metrics::{self, Metrics};
use margindash::serializer::EventPayload;
use margindash::transport::{BatchTransport, HttpTransport, StdoutTransport};
use margindash::MarginDash;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);

    Metrics::init()?;

    let transport: Arc<dyn BatchTransport> = match config.api_key {
        Some(_) => Arc::new(HttpTransport::from_config(&config)?),
        None => {
            warn!("MARGINDASH_API_KEY not set, printing events to stdout");
            Arc::new(StdoutTransport::new())
        }
    };
    info!(
        transport = transport.name(),
        base_url = %config.base_url,
        flush_interval_ms = config.flush_interval.as_millis() as u64,
        batch_size = config.batch_size,
        max_queue_size = config.max_queue_size,
        "Starting margindash-ship"
    );

    let client = MarginDash::with_transport(config, transport, Arc::new(LogReporter))?;
    client.start()?;

    tokio::select! {
        result = read_events(&client) => result?,
        _ = shutdown_signal() => {}
    }

    client.shutdown().await;
    debug!(metrics = %metrics::gather(), "final metrics");
    info!(dropped = client.dropped_count(), "margindash-ship shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());

    // Logs go to stderr; stdout carries dry-run output
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Track every line of stdin until EOF
async fn read_events(client: &MarginDash) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<EventPayload>(line) {
            Ok(payload) => client.track(payload),
            Err(e) => warn!(line = line_no, error = %e, "skipping malformed event"),
        }
    }

    info!(lines = line_no, "stdin closed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
