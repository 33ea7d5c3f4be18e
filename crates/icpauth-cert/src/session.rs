//! Per-transaction session identifiers.

use uuid::Uuid;

/// Produces a fresh opaque identifier per authentication.
pub trait SessionIdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random UUID v4, hyphenated.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSessionIds;

impl SessionIdGenerator for UuidSessionIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
