//! rota-send - Daemon that publishes rotating content on a schedule
//!
//! Loads the channel configuration, checks credentials, then runs every
//! enabled channel on its schedule until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use librotacast::channels::discord::DiscordChannel;
use librotacast::channels::twitter::TwitterChannel;
use librotacast::channels::Channel;
use librotacast::config::{ChannelConfig, ChannelKind};
use librotacast::credentials::{self, DiscordCredentials, TwitterCredentials};
use librotacast::error::ConfigError;
use librotacast::logging::LoggingConfig;
use librotacast::{ChannelPublisher, Config, JsonStateStore, Result, Scheduler, StateStore};
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rota-send")]
#[command(version)]
#[command(about = "Post rotating content to Twitter/X and Discord on a schedule")]
#[command(long_about = "\
rota-send - Post rotating content to Twitter/X and Discord on a schedule

DESCRIPTION:
    rota-send reads content items from CSV files (columns: text,category)
    and posts them one at a time to each enabled channel. Every item is
    posted once before any repeats, and consecutive posts avoid sharing a
    category when another one is available.

    What has been posted is recorded in a JSON state file, so restarts
    continue the rotation where it left off.

USAGE:
    # Run in foreground (logs to stderr)
    rota-send

    # Post the next item on every channel once and exit
    rota-send --once

    # Only run the Discord channel
    rota-send --channel discord

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current post)

CONFIGURATION:
    Configuration file: ~/.config/rotacast/config.toml
    Credentials: environment or a .env file next to the config

    [twitter]
    enabled = true
    content = \"tweets.csv\"
    [twitter.schedule]
    times = [\"09:00\", \"18:00\"]

    [discord]
    enabled = true
    on_empty = \"stop\"
    [discord.schedule]
    interval_hours = 6

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or credential error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "ROTACAST_CONFIG")]
    config: Option<PathBuf>,

    /// Run every scheduled channel once and exit
    #[arg(long)]
    once: bool,

    /// Only run this channel (twitter or discord)
    #[arg(long, value_name = "NAME")]
    channel: Option<ChannelKind>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format (text, json, pretty); overrides the config file
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    let log_format = cli
        .log_format
        .as_deref()
        .unwrap_or(&config.general.log_format);
    LoggingConfig::from_settings(log_format, &config.general.log_level, cli.verbose).init();

    info!("rota-send starting");
    credentials::load_dotenv(&config.dotenv_path());

    let selected: Vec<(ChannelKind, &ChannelConfig)> = config
        .enabled_channels()
        .into_iter()
        .filter(|(kind, _)| cli.channel.map_or(true, |only| only == *kind))
        .collect();
    if selected.is_empty() {
        if let Some(only) = cli.channel {
            return Err(ConfigError::InvalidValue {
                field: "--channel".to_string(),
                reason: format!("channel '{}' is not enabled", only),
            }
            .into());
        }
        return Err(ConfigError::NoChannelEnabled.into());
    }

    let store: Arc<dyn StateStore> = Arc::new(JsonStateStore::new(config.state_path()));
    let state_lock = Arc::new(Mutex::new(()));
    info!("State file: {}", config.state_path().display());

    let mut scheduler = Scheduler::new(config.general.run_on_start);
    for (kind, channel_config) in selected {
        // Credentials are checked even for unscheduled channels so a broken
        // setup is reported at startup.
        let channel = build_channel(kind, channel_config)?;

        let Some(schedule) = channel_config.schedule()? else {
            warn!(channel = kind.name(), "No schedule configured. Skipping.");
            continue;
        };

        let publisher = ChannelPublisher::new(channel, config.content_path(kind), store.clone())
            .with_on_empty(channel_config.on_empty)
            .with_timeout(channel_config.timeout())
            .with_state_lock(state_lock.clone());
        info!(
            channel = kind.name(),
            "Content: {} (on_empty: {})",
            publisher.source().display(),
            channel_config.on_empty
        );
        scheduler.add(publisher, schedule);
    }

    if scheduler.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "schedule".to_string(),
            reason: "no enabled channel has a schedule".to_string(),
        }
        .into());
    }

    if cli.once {
        let outcomes = scheduler.run_once().await;
        for (channel, outcome) in outcomes {
            info!(channel = %channel, "Cycle finished: {:?}", outcome);
        }
        info!("rota-send: ran every channel once, exiting");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    info!("rota-send running {} channel(s). Press Ctrl+C to stop.", scheduler.len());
    scheduler.run(shutdown).await;

    info!("rota-send stopped");
    Ok(())
}

/// Build the delivery channel for `kind` from environment credentials
fn build_channel(kind: ChannelKind, config: &ChannelConfig) -> Result<Box<dyn Channel>> {
    let channel: Box<dyn Channel> = match kind {
        ChannelKind::Twitter => {
            let creds = TwitterCredentials::from_env()?;
            Box::new(TwitterChannel::new(creds, config.timeout())?)
        }
        ChannelKind::Discord => {
            let creds = DiscordCredentials::from_env()?;
            Box::new(DiscordChannel::new(creds.webhook_url.expose_secret(), config.timeout())?)
        }
    };
    Ok(channel)
}

/// Cancel `shutdown` on SIGINT or SIGTERM
#[cfg(unix)]
fn setup_signal_handlers(shutdown: CancellationToken) {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            warn!("Signal setup failed ({}), falling back to Ctrl+C only", e);
            spawn_ctrl_c_handler(shutdown);
            return;
        }
    };

    tokio::spawn(async move {
        if signals.next().await.is_some() {
            info!("Received shutdown signal, stopping gracefully...");
            shutdown.cancel();
        }
    });
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: CancellationToken) {
    spawn_ctrl_c_handler(shutdown);
}

fn spawn_ctrl_c_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping gracefully...");
            shutdown.cancel();
        }
    });
}
