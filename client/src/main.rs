//! `dezero-client` - send one command to a device and print its responses

mod peer;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use dezero_shared::{commands, markers, Command};
use peer::{parse_param, Peer};

#[derive(Debug, Parser)]
#[command(name = "dezero-client", about = "Send a command to a DeZer0 device", version)]
struct Cli {
    /// Device address
    #[arg(long, default_value = "127.0.0.1:8888")]
    addr: String,

    /// Upgrade to WebSocket framing instead of line-delimited JSON
    #[arg(long)]
    websocket: bool,

    /// How long to wait for each response, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Query device information
    Info,
    /// Scan for Wi-Fi networks
    Scan,
    /// Liveness probe
    Ping,
    /// Run a program file through the device's execution delegate
    Exec {
        file: PathBuf,
        /// Parameter passed to the program as key=value (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Send a raw JSON message
    Raw { json: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let (message, until) = build_message(&cli.action)?;

    let stream = TcpStream::connect(&cli.addr)
        .await
        .with_context(|| format!("failed to connect to {}", cli.addr))?;
    info!("[CLIENT] connected to {}", cli.addr);

    if cli.websocket {
        let host = cli.addr.clone();
        exchange(Peer::websocket(stream, &host).await?, &message, until, cli.timeout_ms).await
    } else {
        exchange(Peer::line(stream), &message, until, cli.timeout_ms).await
    }
}

/// When to stop reading responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Until {
    /// A single response (or silence)
    One,
    /// The execution end marker
    Finished,
}

fn build_message(action: &Action) -> Result<(Value, Until)> {
    let message = match action {
        Action::Info => Command::new(commands::GET_DEVICE_INFO).to_json(),
        Action::Scan => Command::new(commands::SCAN_WIFI).to_json(),
        Action::Ping => Command::new(commands::PING).to_json(),
        Action::Exec { file, params } => {
            let program = std::fs::read(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mut map = Map::new();
            for raw in params {
                let (key, value) = parse_param(raw)?;
                map.insert(key, value);
            }
            let command = Command::new(commands::EXECUTE_SCRIPT)
                .with_param("script", BASE64.encode(program))
                .with_param("params", Value::Object(map));
            return Ok((command.to_json(), Until::Finished));
        }
        Action::Raw { json } => serde_json::from_str(json).context("raw message is not JSON")?,
    };
    Ok((message, Until::One))
}

async fn exchange<S: AsyncRead + AsyncWrite>(
    mut peer: Peer<S>,
    message: &Value,
    until: Until,
    timeout_ms: u64,
) -> Result<()> {
    peer.send(message).await?;
    debug!("[CLIENT] sent {}", message);

    let wait = Duration::from_millis(timeout_ms);
    loop {
        match peer.next_response_within(wait).await? {
            Some(line) => {
                println!("{}", line);
                if until == Until::One || line == markers::EXECUTION_FINISHED {
                    break;
                }
            }
            None => {
                warn!("[CLIENT] no response within {} ms", timeout_ms);
                break;
            }
        }
    }

    peer.close().await
}
