mod config_commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    ferry_config::{FerryConfig, Severity},
    ferry_relay::{HttpFetcher, SizeGate, status::text::format_bytes},
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "ferry", version, about = "Relay files from URLs into Telegram chats")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of searching the standard locations.
    #[arg(long, short, global = true, env = "FERRY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default when no subcommand is provided).
    Run,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Check whether a URL would pass the size gate, without downloading it.
    Probe {
        /// The http(s) URL to probe.
        url: String,
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

/// Load the explicit config file, or discover one, then apply env overrides.
fn load_config(path: Option<&Path>) -> anyhow::Result<FerryConfig> {
    let config = match path {
        Some(path) => ferry_config::load_config(path)?,
        None => ferry_config::discover_and_load(),
    };
    Ok(ferry_config::apply_env_overrides(config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "ferry starting");
            run(load_config(cli.config.as_deref())?).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
        Some(Commands::Probe { url }) => probe(&url, &load_config(cli.config.as_deref())?).await,
    }
}

async fn run(config: FerryConfig) -> anyhow::Result<()> {
    let result = ferry_config::validate(&config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
        }
    }
    if result.has_errors() {
        anyhow::bail!(
            "invalid configuration: {} error(s)",
            result.count(Severity::Error)
        );
    }

    let relay = config.relay.to_relay_config();
    info!(
        max_file_size = relay.max_file_size,
        status_interval_ms = config.relay.status_interval_ms,
        staging_dir = %relay.staging_dir.display(),
        "relay settings"
    );
    let fetcher = Arc::new(HttpFetcher::new()?);
    let polling = ferry_telegram::start_polling(config.telegram, relay, fetcher)
        .await
        .context("failed to start telegram bot")?;

    let stopped = polling.cancel_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("shutdown requested");
        },
        () = stopped.cancelled() => warn!("telegram polling stopped on its own"),
    }
    polling.shutdown().await;
    Ok(())
}

async fn probe(raw: &str, config: &FerryConfig) -> anyhow::Result<()> {
    let url = ferry_telegram::handlers::parse_relay_url(raw.trim())
        .map_err(|reply| anyhow::anyhow!("{reply}"))?;
    let fetcher = HttpFetcher::new()?;
    let gate = SizeGate::new(config.relay.max_file_size);

    match gate.check(&fetcher, &url).await {
        Ok(Some(size)) => println!(
            "{url}\n  size: {} ({size} bytes)\n  limit: {}\n  would be relayed",
            format_bytes(size),
            format_bytes(gate.ceiling())
        ),
        Ok(None) => println!(
            "{url}\n  size: not declared\n  limit: {}\n  would be relayed with byte-count progress",
            format_bytes(gate.ceiling())
        ),
        Err(e) => {
            println!("{url}\n  {}", e.status_text());
            return Err(e.into());
        },
    }
    Ok(())
}
