//! # taskwire
//!
//! Terminal client for the real-time task event channel. Prints every
//! status change and forwarded event as one JSON line on stdout;
//! diagnostics go to stderr through `tracing`.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use taskwire_channel::{Channel, SharedToken, Subscription};
use taskwire_core::logging::{LogFormat, init_subscriber};
use taskwire_core::{ClientMessage, ConnectionStatus, StatusChange};
use taskwire_settings::{TaskwireSettings, load_settings, load_settings_from_path};

/// Real-time task event client.
#[derive(Parser, Debug)]
#[command(name = "taskwire", about = "Real-time task event client")]
struct Cli {
    /// Settings file (defaults to `~/.taskwire/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and stream events until interrupted.
    Watch(WatchArgs),
    /// Print the effective settings as JSON.
    Settings,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Server base URL (overrides settings).
    #[arg(long)]
    server_url: Option<String>,

    /// Bearer token used for the handshake.
    #[arg(long, env = "TASKWIRE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Event type to print. Repeatable; all events when omitted.
    #[arg(long = "event", value_name = "TYPE")]
    events: Vec<String>,

    /// Request connection statistics after each successful connect.
    #[arg(long)]
    stats: bool,
}

fn load(cli: &Cli) -> Result<TaskwireSettings> {
    match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => load_settings().context("Failed to load settings"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        settings.logging.format
    };
    init_subscriber(&settings.logging.level, format);

    match cli.command {
        Command::Watch(args) => watch(settings, args).await,
        Command::Settings => {
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{json}");
            Ok(())
        }
    }
}

fn print_event(event: &serde_json::Value) {
    println!("{event}");
}

async fn watch(mut settings: TaskwireSettings, args: WatchArgs) -> Result<()> {
    if let Some(url) = args.server_url {
        settings.channel.server_url = url;
    }
    let Some(token) = args.token.filter(|t| !t.is_empty()) else {
        bail!("No token: pass --token or set TASKWIRE_TOKEN");
    };

    let channel = Channel::new(settings.channel, Arc::new(SharedToken::new(token)))
        .context("Failed to create channel")?;

    let (status_tx, mut statuses) = mpsc::unbounded_channel();
    let _status = channel.on_status_change(move |change| {
        let _ = status_tx.send(change);
    });

    let _subscriptions: Vec<Subscription> = if args.events.is_empty() {
        vec![channel.subscribe_all(print_event)]
    } else {
        args.events
            .iter()
            .map(|event_type| channel.subscribe(event_type, print_event))
            .collect()
    };

    channel.connect().await;
    if channel.status() == ConnectionStatus::Disconnected {
        bail!("Channel did not start connecting");
    }

    follow(&channel, &mut statuses, args.stats, tokio::signal::ctrl_c()).await
}

/// Print status changes until `shutdown` resolves or the channel settles.
///
/// Returns an error once the channel gives up reconnecting.
async fn follow<S>(
    channel: &Channel,
    statuses: &mut mpsc::UnboundedReceiver<StatusChange>,
    request_stats: bool,
    shutdown: S,
) -> Result<()>
where
    S: Future,
{
    tokio::pin!(shutdown);
    let mut started = false;
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("interrupted, disconnecting");
                channel.disconnect().await;
                return Ok(());
            }
            change = statuses.recv() => {
                let Some(change) = change else {
                    return Ok(());
                };
                println!("{}", serde_json::to_string(&change)?);
                match change.status {
                    ConnectionStatus::Connected if request_stats => {
                        if !channel.send_message(&ClientMessage::Stats) {
                            warn!("stats request dropped");
                        }
                    }
                    ConnectionStatus::Disconnected if started => {
                        info!("server closed the connection");
                        return Ok(());
                    }
                    ConnectionStatus::Error => {
                        let faults = channel.subscriber_faults().len();
                        bail!("Gave up reconnecting ({faults} subscriber faults recorded)");
                    }
                    _ => {}
                }
                started |= change.status != ConnectionStatus::Disconnected;
            }
        }
    }
}
