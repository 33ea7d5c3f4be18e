//! tracing-subscriber setup
//!
//! `RUST_LOG` wins over the configured directives when it is set.

use anyhow::{Context, Result};
use icpauth_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(logging: &LoggingConfig) -> Result<()> {
    let filter = build_filter(logging)?;
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line),
            )
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}

fn build_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(logging.filter_directives())
            .with_context(|| format!("Invalid log filter: {}", logging.filter_directives())),
    }
}
