//! Configuration management for the ICP-Brasil certificate authenticator.
//!
//! This module provides the configuration system used by the server binary:
//! - Loading from YAML files
//! - Environment variable overrides (`ICPAUTH_*`)
//! - Validation of all settings
//! - Listener, TLS, API and logging sections

use crate::channel::LogChannel;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```no_run
/// use icpauth_core::config::AppConfig;
///
/// let config = AppConfig::from_file("config/icpauth.yaml").unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application-wide settings
    #[serde(default)]
    pub app: ApplicationConfig,

    /// Listener and mutual-TLS settings
    #[serde(default)]
    pub server: ServerConfig,

    /// HTTP API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering `ICPAUTH__*`
    /// environment variables over the file (`ICPAUTH__SERVER__BIND_ADDR`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("ICPAUTH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// Checks the bind address, connection limit, TLS file presence and
    /// every configured log level.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.api.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Graceful shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_app_name() -> String {
    "icpauth".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_environment(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g. "0.0.0.0:8443")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// TLS configuration. Without it the listener serves plain HTTP and no
    /// client certificate can ever be presented.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_max_connections() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_connections: default_max_connections(),
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::invalid_value("server.bind_addr", e.to_string()).into()
        })
    }

    /// Returns the configured port, if the bind address parses.
    pub fn port(&self) -> Option<u16> {
        self.socket_addr().ok().map(|addr| addr.port())
    }

    /// Validates the listener configuration.
    pub fn validate(&self) -> Result<()> {
        let addr = self.socket_addr()?;
        if addr.port() == 0 {
            return Err(ConfigError::invalid_value("server.bind_addr", "Port cannot be 0").into());
        }

        if self.max_connections == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_connections",
                "must be greater than 0",
            )
            .into());
        }

        if let Some(tls) = &self.tls {
            tls.validate()?;
        }

        Ok(())
    }
}

/// Client certificate requirement on the TLS listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuthMode {
    /// Handshake fails without a trusted client certificate
    Required,
    /// Clients may connect without a certificate; presented ones must still
    /// chain to the configured CA
    #[default]
    Optional,
}

/// TLS listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Server certificate chain (PEM)
    pub cert_path: PathBuf,

    /// Server private key (PEM)
    pub key_path: PathBuf,

    /// CA bundle used to verify client certificates (PEM), typically the
    /// ICP-Brasil root and intermediate certificates
    pub client_ca_path: PathBuf,

    /// Whether a client certificate is mandatory
    #[serde(default)]
    pub client_auth: ClientAuthMode,
}

impl TlsConfig {
    /// Validates that every referenced file exists.
    pub fn validate(&self) -> Result<()> {
        for (field, path) in [
            ("server.tls.cert_path", &self.cert_path),
            ("server.tls.key_path", &self.key_path),
            ("server.tls.client_ca_path", &self.client_ca_path),
        ] {
            if !path.exists() {
                return Err(
                    ConfigError::invalid_value(field, format!("file not found: {:?}", path)).into(),
                );
            }
        }
        Ok(())
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Whether to enable permissive CORS
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Whether to serve the OpenAPI document
    #[serde(default = "default_true")]
    pub enable_openapi: bool,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors: true,
            request_timeout_secs: default_request_timeout(),
            enable_openapi: true,
        }
    }
}

impl ApiConfig {
    /// Validates the API configuration.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "api.request_timeout_secs",
                "must be greater than 0",
            )
            .into());
        }
        Ok(())
    }

    /// Returns the request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,

    /// Per-channel log levels, e.g. `transaction: info`
    #[serde(default)]
    pub channels: BTreeMap<LogChannel, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
            channels: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        parse_level("logging.level", &self.level)
    }

    /// Validates the default level and every channel override.
    pub fn validate(&self) -> Result<()> {
        self.parse_level()?;
        for (channel, level) in &self.channels {
            parse_level(&format!("logging.channels.{}", channel), level)?;
        }
        Ok(())
    }

    /// Builds an `EnvFilter`-compatible directive string, for example
    /// `info,icpauth::transaction=debug`.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.to_lowercase()];
        for (channel, level) in &self.channels {
            directives.push(format!("{}={}", channel.target(), level.to_lowercase()));
        }
        directives.join(",")
    }
}

fn parse_level(field: &str, value: &str) -> Result<Level> {
    value.parse().map_err(|_| {
        ConfigError::invalid_value(field, format!("Invalid log level: {}", value)).into()
    })
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}
