mod config_commands;
mod db_commands;
mod run;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    gatehouse_config::GatehouseConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "gatehouse", about = "Gatehouse: interview gatekeeping and timed moderation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to `bot.log_level`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of searching the standard locations.
    #[arg(long, global = true, env = "GATEHOUSE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and run the bot (default when no subcommand is provided).
    Run,
    /// Validate the configuration file and report errors/warnings.
    CheckConfig {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Run all pending database migrations.
    Migrate,
    /// List timed sanctions waiting to be reverted.
    Pending,
}

fn init_telemetry(cli: &Cli, config: &GatehouseConfig) {
    let level = cli.log_level.as_deref().unwrap_or(&config.bot.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

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

fn load_config(path: Option<&Path>) -> anyhow::Result<GatehouseConfig> {
    match path {
        Some(path) => {
            let mut config = gatehouse_config::load_config(path)?;
            gatehouse_config::apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(gatehouse_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_telemetry(&cli, &config);

    info!(version = env!("CARGO_PKG_VERSION"), "gatehouse starting");

    match cli.command {
        // Default: run the bot when no subcommand is provided
        None | Some(Commands::Run) => run::run(config).await,
        Some(Commands::CheckConfig { verbose }) => {
            config_commands::check(cli.config.as_deref(), verbose)
        },
        Some(Commands::Migrate) => db_commands::migrate(&config).await,
        Some(Commands::Pending) => db_commands::pending(&config).await,
    }
}
