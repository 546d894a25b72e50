#![forbid(unsafe_code)]

//! `courier-gateway` — messaging gateway server binary.
//!
//! Bootstraps configuration, launches the bridge client, starts the HTTP
//! gateway, and wires process signals into graceful session shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use courier_gateway::client::bridge::BridgeClient;
use courier_gateway::client::ProtocolClient;
use courier_gateway::config::GlobalConfig;
use courier_gateway::render::QrSvgRenderer;
use courier_gateway::session::SessionManager;
use courier_gateway::{http, AppError, Result};

/// Capacity of the client event channel.
const EVENT_QUEUE: usize = 64;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "courier-gateway", about = "Messaging gateway server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP port from the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("courier-gateway server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Build the session core ──────────────────────────
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
    let bridge = Arc::new(BridgeClient::new(
        config.bridge.clone(),
        config.send_ack(),
        events_tx,
    ));
    let manager = SessionManager::new(
        bridge as Arc<dyn ProtocolClient>,
        Arc::new(QrSvgRenderer),
        &config,
    );

    let ct = CancellationToken::new();

    // ── Start the event pump and the protocol client ────
    let pump_ct = ct.clone();
    let pump_manager = Arc::clone(&manager);
    let pump_handle = tokio::spawn(pump_manager.run_events(events_rx, pump_ct));

    manager.start().await;

    // ── Start the HTTP gateway ──────────────────────────
    let http_ct = ct.clone();
    let http_manager = Arc::clone(&manager);
    let http_port = config.http_port;
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(http_manager, http_port, http_ct).await {
            error!(%err, "HTTP gateway failed");
        }
    });

    info!("gateway ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");

    // ── Graceful shutdown with fatal escape hatch ───────
    match tokio::time::timeout(config.shutdown_grace(), manager.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(%err, "error during session shutdown"),
        Err(_elapsed) => {
            // The state machine never saw this path complete; terminating
            // here is the escape hatch, not a normal transition.
            error!("graceful shutdown timed out, terminating");
            std::process::exit(1);
        }
    }

    // ── Stop accepting connections and drain tasks ──────
    ct.cancel();
    let _ = tokio::join!(pump_handle, http_handle);
    info!("courier-gateway shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
