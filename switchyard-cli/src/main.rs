//! Switchyard CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use switchyard_config::{load_config, Config};
use switchyard_runtime::{ServerBuilder, SignalHandler};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Switchyard API gateway", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the gateway (start the server)
    Serve {
        /// Path to configuration file; without one the environment is used
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen port, overriding configuration and PORT
        #[arg(short, long)]
        port: Option<u16>,

        /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
        #[arg(short, long)]
        log_level: Option<String>,

        /// Log output format
        #[arg(long, value_enum)]
        log_format: Option<LogFormat>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            log_level,
            log_format,
        } => {
            let mut cfg = load_config(config.as_deref())
                .with_context(|| match &config {
                    Some(path) => format!("failed to load {}", path.display()),
                    None => "failed to build configuration from the environment".to_string(),
                })?;

            if let Some(port) = port {
                cfg.gateway.listen.set_port(port);
            }

            let logging = &cfg.observability.logging;
            let level = log_level.unwrap_or_else(|| logging.level.clone());
            let format = log_format.unwrap_or(match logging.format.as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            });
            init_tracing(&level, format)?;

            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                config = ?config,
                "Starting Switchyard"
            );
            log_summary(&cfg);

            let server = ServerBuilder::new().config(cfg).build()?;

            let shutdown_signal = server.shutdown_signal();
            tokio::spawn(async move {
                let handler = SignalHandler::new(shutdown_signal);
                handler.run().await;
            });

            server.run().await?;

            Ok(())
        }

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            tracing::info!("Validating configuration: {}", config.display());

            match load_config(Some(&config)) {
                Ok(cfg) => {
                    tracing::info!("Configuration is valid");
                    log_summary(&cfg);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("Switchyard API gateway");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

fn log_summary(config: &Config) {
    tracing::info!(
        listen = %config.gateway.listen,
        mode = ?config.gateway.mode,
        request_timeout = ?config.gateway.request_timeout,
        rate_limit_enabled = config.rate_limit.enabled,
        rate_limit_max = config.rate_limit.max_requests,
        rate_limit_window = ?config.rate_limit.window,
        "Configuration loaded"
    );
    for route in config.effective_routes() {
        tracing::info!(
            prefix = %route.prefix,
            target = %route.target,
            rewrite = route.rewrite.as_deref(),
            "Route"
        );
    }
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level.to_lowercase())
            .with_context(|| format!("invalid log level '{level}'"))?,
    };

    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer().with_target(false)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_current_span(false))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();

    Ok(())
}
