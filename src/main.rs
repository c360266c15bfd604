mod command;
mod config;
mod connection;
mod delegate;
mod device;
mod session;
mod status;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use command::handlers::HandlerContext;
use command::CommandDispatcher;
use config::{DelegateKind, NodeConfig, ScannerKind};
use connection::{bind_with_retry, NodeServer};
use delegate::{ExecutionDelegate, InterpreterDelegate, ToolTable};
use device::{DeviceInfoSource, NetworkScanner, NmcliScanner, NoScanner, SystemInfoSource};
use status::{ListenerLink, LogDisplay, StatusBoard};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "dezero-node", about = "DeZer0 device command endpoint", version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long)]
    listen: Option<String>,

    /// Override the reported device identifier
    #[arg(long)]
    device_id: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let config = load_config(&args)?;
    info!("Device node starting: {}", config.device_id);
    info!("  Listen: {}", config.listen);

    if let Err(e) = run(config).await {
        error!("Node halted: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn load_config(args: &Cli) -> Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load_from_path(path)?,
        None => NodeConfig::default(),
    };
    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }
    if let Some(device_id) = &args.device_id {
        config.device_id = device_id.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: NodeConfig) -> Result<()> {
    let device: Arc<dyn DeviceInfoSource> = Arc::new(SystemInfoSource::new(
        &config.device_id,
        &config.firmware_version,
        config.flash_total,
    ));

    let scanner: Arc<dyn NetworkScanner> = match config.scanner.kind {
        ScannerKind::None => Arc::new(NoScanner),
        ScannerKind::Nmcli => Arc::new(NmcliScanner::new()),
    };

    let delegate: Arc<dyn ExecutionDelegate> = match config.delegate.kind {
        DelegateKind::Tools => Arc::new(ToolTable::new(device.clone())),
        DelegateKind::Interpreter => Arc::new(InterpreterDelegate::new(
            &config.delegate.command,
            config.delegate_timeout(),
        )?),
    };
    info!(
        "  Scanner: {}, delegate: {}",
        scanner.name(),
        delegate.name()
    );

    let dispatcher = Arc::new(CommandDispatcher::new(HandlerContext {
        device,
        scanner,
        delegate,
        max_scan_results: config.scanner.max_results,
    }));

    let listener = bind_with_retry(
        &config.listen,
        config.listener.bind_retries,
        config.bind_retry_delay(),
    )
    .await?;
    let bound = listener.local_addr().context("listener has no local address")?;

    let status = StatusBoard::new(Box::new(LogDisplay), Arc::new(ListenerLink::new(bound)));

    NodeServer::new(
        listener,
        config.session_config(),
        dispatcher,
        status,
        config.max_sessions,
    )
    .run_until(shutdown_signal())
    .await
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to init tracing: {}", e))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to init tracing: {}", e))?,
    }
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
            Err(e) => {
                warn!("Failed to register SIGTERM handler, using ctrl-c only: {}", e);
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            error!("Ctrl-c handler failed: {}", e);
        }
    }
}
