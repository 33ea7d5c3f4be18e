use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use icpauth_api::ServerBuilder;
use icpauth_core::config::LogFormat;
use icpauth_core::AppConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

mod telemetry;

/// icpauth - identity extraction from ICP-Brasil client certificates over mutual TLS
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "ICPAUTH_CONFIG", default_value = "config/icpauth.yaml")]
    config: PathBuf,

    /// Override bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Override log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_config_builder(&args.config)
        .with_context(|| format!("Failed to load config file: {}", args.config.display()))?;

    if let Some(bind) = args.bind {
        config.server.bind_addr = bind.to_string();
    }
    if let Some(format) = args.log_format {
        config.logging.format = format.into();
    }

    telemetry::init(&config.logging)?;

    info!("Configuration loaded from {}", args.config.display());
    info!("Bind address: {}", config.server.bind_addr);
    info!(
        "Client certificates: {}",
        match &config.server.tls {
            Some(tls) => format!("{:?} (CA bundle {})", tls.client_auth, tls.client_ca_path.display()),
            None => "disabled".to_string(),
        }
    );

    let server = ServerBuilder::new(config).build()?;

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
