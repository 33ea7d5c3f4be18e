//! Named log channels.
//!
//! The authenticator writes to two logical channels. Each one is a fixed
//! `tracing` target so subscribers can route them to different sinks or
//! filter them independently (`RUST_LOG=icpauth::transaction=info`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target for request arrival, malformed input and handler-level errors.
pub const ACCESS_TARGET: &str = "icpauth::access";

/// Target for the audit line, validity warnings and extraction errors.
pub const TRANSACTION_TARGET: &str = "icpauth::transaction";

/// The two log channels of the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogChannel {
    /// Request-level events emitted by the HTTP layer.
    Access,
    /// Authentication transactions and their audit trail.
    Transaction,
}

impl LogChannel {
    /// All channels, in a stable order.
    pub const ALL: [LogChannel; 2] = [LogChannel::Access, LogChannel::Transaction];

    /// The `tracing` target events on this channel are emitted with.
    pub const fn target(self) -> &'static str {
        match self {
            LogChannel::Access => ACCESS_TARGET,
            LogChannel::Transaction => TRANSACTION_TARGET,
        }
    }

    /// Short name used in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            LogChannel::Access => "access",
            LogChannel::Transaction => "transaction",
        }
    }
}

impl fmt::Display for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogChannel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "access" => Ok(LogChannel::Access),
            "transaction" => Ok(LogChannel::Transaction),
            other => Err(format!("unknown log channel: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_targets_are_distinct() {
        assert_ne!(LogChannel::Access.target(), LogChannel::Transaction.target());
        assert!(LogChannel::ALL
            .iter()
            .all(|c| c.target().starts_with("icpauth::")));
    }

    #[test]
    fn test_channel_from_str() {
        assert_eq!("access".parse::<LogChannel>(), Ok(LogChannel::Access));
        assert_eq!("TRANSACTION".parse::<LogChannel>(), Ok(LogChannel::Transaction));
        assert!("audit".parse::<LogChannel>().is_err());
    }

    #[test]
    fn test_channel_serde() {
        let json = serde_json::to_string(&LogChannel::Transaction).unwrap();
        assert_eq!(json, "\"transaction\"");
    }
}
