mod config_commands;
mod deferred_commands;
mod plugin_commands;
mod switch_commands;

use std::{path::PathBuf, sync::Arc};

use {
    botlink_config::BotConfig,
    botlink_gateway::Gateway,
    botlink_metrics::{MetricsRecorderConfig, init_metrics},
    botlink_plugins::{Dispatcher, bundled},
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "botlink", about = "botlink: chat-bot gateway client", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery).
    #[arg(long, short, global = true, env = "BOTLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config value).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Gateway WebSocket URL (overrides config value).
    #[arg(long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the gateway and serve (default when no subcommand is provided).
    Run,
    /// Load every plugin once and print the load report.
    Plugins {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Inspect or flip module switches.
    Switch {
        #[command(subcommand)]
        action: switch_commands::SwitchAction,
    },
    /// Inspect persisted deferred actions.
    Deferred {
        #[command(subcommand)]
        action: deferred_commands::DeferredCommand,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Discovered config with the command-line overrides applied on top.
fn load_config(cli: &Cli) -> BotConfig {
    let mut config = botlink_config::discover_and_load(cli.config.as_deref());
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    if let Some(url) = &cli.url {
        config.gateway.url = url.clone();
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = load_config(&cli);

    match cli.command {
        None | Some(Commands::Run) => run(config).await,
        Some(Commands::Plugins { json }) => plugin_commands::handle_plugins(&config, json),
        Some(Commands::Switch { action }) => switch_commands::handle_switch(&config, action).await,
        Some(Commands::Deferred { action }) => {
            deferred_commands::handle_deferred(&config, action).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(&config, cli.config.as_deref(), action)
        },
    }
}

async fn run(config: BotConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "botlink starting");

    let _ = rustls::crypto::ring::default_provider().install_default();

    init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        listen: config.metrics.listen.clone(),
        global_labels: vec![("service".into(), "botlink".into())],
    })?;

    let gateway = Gateway::build(Arc::new(config), bundled::catalog());
    spawn_reload_on_hangup(gateway.dispatcher());

    tokio::select! {
        () = gateway.run() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("received Ctrl+C, shutting down");
            Ok(())
        },
    }
}

/// Reload plugins on SIGHUP.
#[cfg(unix)]
fn spawn_reload_on_hangup(dispatcher: Arc<Dispatcher>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "failed to install SIGHUP handler, plugin reload disabled");
            return;
        },
    };
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match dispatcher.reload_off_runtime().await {
                Ok(report) => info!(
                    loaded = report.loaded.len(),
                    failed = report.failed.len(),
                    "plugins reloaded on SIGHUP"
                ),
                Err(e) => warn!(error = %e, "plugin reload task failed"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_dispatcher: Arc<Dispatcher>) {}
