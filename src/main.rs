//! modelgate CLI - Rate-limited gateway in front of hosted model classes.

use clap::{Parser, Subcommand};
use modelgate::api::{create_router, AppState};
use modelgate::config::{Config, LogFormat};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "modelgate")]
#[command(about = "Rate-limited gateway for general, coding, vision and audio models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Log output format (overrides the config file)
        #[arg(short, long, value_enum)]
        log_format: Option<LogFormatArg>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormatArg {
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, log_format, config }) => {
            run_server(port, log_format, config).await?;
        }
        Some(Commands::Config { path }) => {
            show_config(path)?;
        }
        None => {
            run_server(None, None, None).await?;
        }
    }

    Ok(())
}

async fn run_server(
    port_override: Option<u16>,
    log_format: Option<LogFormatArg>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = config.with_env_overrides();

    init_tracing(&config, log_format.map(Into::into));

    if config.provider.api_key.is_none() {
        tracing::warn!("No provider API key configured; upstream calls will be rejected");
    }

    let state = AppState::from_config(&config)?;
    state.media.ensure_dir().await?;

    let port = port_override.unwrap_or(config.gateway.port);
    let addr: SocketAddr = format!("{}:{}", config.gateway.host, port).parse()?;

    let app = create_router(state);

    println!("→ modelgate starting on http://{}", addr);
    println!("→ Generate: POST http://{}/api/generate", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\nGateway stopped.");
    Ok(())
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(config: &Config, format_override: Option<LogFormat>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format_override.unwrap_or(config.logging.format) {
        LogFormat::Compact => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn show_config(show_path: bool) -> anyhow::Result<()> {
    if show_path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    let mut config = Config::load()?.with_env_overrides();
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("<redacted>".to_string());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
