use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    groupcast_config::GroupcastConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "groupcast", version, about = "Groupcast: WhatsApp group messaging over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "GROUPCAST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default).
    Gateway {
        /// Address to bind to; overrides HOST and the config file.
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on; overrides PORT and the config file.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective configuration with secrets redacted.
    Config,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<GroupcastConfig> {
    groupcast_config::load(cli.config.as_deref()).context("failed to load configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut config = load_config(&cli)?;

    match cli.command {
        None => {
            info!(version = env!("CARGO_PKG_VERSION"), "groupcast starting");
            groupcast_gateway::start_gateway(config).await
        },
        Some(Commands::Gateway { bind, port }) => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            info!(version = env!("CARGO_PKG_VERSION"), "groupcast starting");
            groupcast_gateway::start_gateway(config).await
        },
        Some(Commands::Config) => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("failed to serialize configuration")?;
            print!("{rendered}");
            Ok(())
        },
    }
}
