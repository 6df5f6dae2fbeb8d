//! `rpclite`: call functions on RPClite firmware from the command line.
//!
//! ```text
//! rpclite --port /dev/ttyACM0 call add 15 7
//! rpclite --config board.yaml notify led true
//! rpclite --port COM3 listen --seconds 30
//! ```

mod json;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rpclite_client::{ClientConfig, RpcClient, RpcError};
use serde_yaml::{Mapping, Value as Yaml};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Talk to RPClite firmware over a serial port.
#[derive(Parser, Debug)]
#[command(name = "rpclite", version)]
struct Cli {
    /// YAML file with connection settings (flags override it)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Serial port (e.g. /dev/ttyACM0, COM3)
    #[arg(long, short)]
    port: Option<String>,

    /// Baud rate
    #[arg(long, short)]
    baud: Option<u32>,

    /// Timeout of a single read, in milliseconds
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// How long a call waits for its response, in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call a method and print its result as JSON
    Call {
        method: String,
        /// Arguments, each parsed as JSON (plain words are strings)
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Send a notification (no response is expected)
    Notify {
        method: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print notifications from the device as JSON lines
    Listen {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let file = match &cli.config {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let config = resolve_config(file.as_deref(), &cli)?;
    debug!(?config, "resolved configuration");

    let client = RpcClient::open(config)?;

    match cli.command {
        Command::Call { method, args } => {
            let args = args.iter().map(|a| json::parse_arg(a)).collect();
            match client.call(&method, args) {
                Ok(value) => {
                    println!("{}", json::to_json(&value));
                    Ok(ExitCode::SUCCESS)
                }
                Err(RpcError::Remote(err)) => {
                    eprintln!("remote error: {err}");
                    Ok(ExitCode::FAILURE)
                }
                Err(err) => Err(err).with_context(|| format!("call to {method} failed")),
            }
        }
        Command::Notify { method, args } => {
            let args = args.iter().map(|a| json::parse_arg(a)).collect();
            client
                .notify(&method, args)
                .with_context(|| format!("notify {method} failed"))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Listen { seconds } => {
            listen(&client, seconds.map(Duration::from_secs))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn listen(client: &RpcClient, limit: Option<Duration>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    client.set_notification_handler(|method, args| {
        let line = serde_json::json!({
            "method": method,
            "args": args.iter().map(json::to_json).collect::<Vec<_>>(),
        });
        println!("{line}");
    });

    info!(port = client.name(), "listening for notifications");
    let started = std::time::Instant::now();
    while running.load(Ordering::SeqCst) {
        let slice = match limit {
            Some(limit) => {
                let left = limit.saturating_sub(started.elapsed());
                if left.is_zero() {
                    break;
                }
                left.min(Duration::from_millis(250))
            }
            None => Duration::from_millis(250),
        };
        client.poll(slice).context("connection lost")?;
    }
    Ok(())
}

/// Merge the optional YAML config file with command-line overrides.
fn resolve_config(file: Option<&str>, cli: &Cli) -> Result<ClientConfig> {
    let mut doc = match file {
        Some(text) => serde_yaml::from_str::<Mapping>(text).context("invalid config file")?,
        None => Mapping::new(),
    };
    if let Some(port) = &cli.port {
        doc.insert("port".into(), Yaml::from(port.clone()));
    }
    if let Some(baud) = cli.baud {
        doc.insert("baud_rate".into(), Yaml::from(baud));
    }
    if let Some(ms) = cli.read_timeout_ms {
        doc.insert("read_timeout_ms".into(), Yaml::from(ms));
    }
    if let Some(ms) = cli.deadline_ms {
        doc.insert("call_deadline_ms".into(), Yaml::from(ms));
    }
    if !doc.contains_key("port") {
        anyhow::bail!("no serial port given (use --port or a config file)");
    }
    serde_yaml::from_value(Yaml::Mapping(doc)).context("invalid configuration")
}
