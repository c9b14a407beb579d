use std::path::PathBuf;

use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier — WhatsApp ↔ Codex bridge")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long)]
    port: Option<u16>,

    /// Config file to load instead of ./courier.toml.
    #[arg(long, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut settings = match &cli.config {
        Some(path) => {
            let mut settings = courier_config::load_settings(path)?;
            courier_config::apply_env_overrides(&mut settings);
            settings
        },
        None => courier_config::discover_and_load()?,
    };
    if let Some(bind) = cli.bind {
        settings.app_host = bind;
    }
    if let Some(port) = cli.port {
        settings.app_port = port;
    }

    info!(
        mode = ?settings.access_mode,
        database = %settings.database_path.display(),
        "starting courier"
    );
    courier_gateway::start_gateway(settings).await
}
