//! # icpauth Core
//!
//! Error handling, configuration and log channel definitions shared by the
//! ICP-Brasil certificate authenticator crates.
//!
//! - **Errors**: the `thiserror` taxonomy used across the workspace. Input errors
//!   (no certificate presented) are kept apart from extraction errors (the
//!   certificate was there but could not be turned into an identity).
//! - **Configuration**: YAML files with `ICPAUTH__` environment overrides and
//!   validation.
//! - **Channels**: the two named log channels (`access` and `transaction`).
//!
//! ## Example
//!
//! ```
//! use icpauth_core::config::AppConfig;
//!
//! let config = AppConfig::from_yaml(
//!     r#"
//! server:
//!   bind_addr: 127.0.0.1:8443
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.server.port(), Some(8443));
//! ```

pub mod channel;
pub mod config;
pub mod error;

pub use channel::LogChannel;
pub use config::AppConfig;
pub use error::{
    CertificateError, ConfigError, ExtractionError, IcpAuthError, InputError, Result,
};
