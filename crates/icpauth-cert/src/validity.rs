//! Temporal validity of a certificate.

use chrono::{DateTime, Utc};
use icpauth_core::channel::TRANSACTION_TARGET;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidityError {
    #[error("certificate expired on {not_after}")]
    Expired { not_after: DateTime<Utc> },

    #[error("certificate not valid before {not_before}")]
    NotYetValid { not_before: DateTime<Utc> },

    #[error("validity window is inverted: {not_before} > {not_after}")]
    InvalidWindow {
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    },
}

/// Checks `not_before <= now <= not_after` against an injected clock.
#[derive(Clone)]
pub struct ValidityChecker {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ValidityChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidityChecker").finish_non_exhaustive()
    }
}

impl Default for ValidityChecker {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ValidityChecker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Both bounds are inclusive.
    pub fn check(
        &self,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Result<(), ValidityError> {
        if not_before > not_after {
            return Err(ValidityError::InvalidWindow {
                not_before,
                not_after,
            });
        }

        let now = self.clock.now();
        if now < not_before {
            return Err(ValidityError::NotYetValid { not_before });
        }
        if now > not_after {
            return Err(ValidityError::Expired { not_after });
        }
        Ok(())
    }

    /// Like [`ValidityChecker::check`], but failures degrade to `false` with a
    /// warning on the transaction channel.
    pub fn is_currently_valid(&self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> bool {
        match self.check(not_before, not_after) {
            Ok(()) => true,
            Err(e) => {
                warn!(target: TRANSACTION_TARGET, reason = %e, "Certificate outside its validity period");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn fixed() -> (ValidityChecker, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        (ValidityChecker::new(Arc::new(FixedClock(now))), now)
    }

    #[test]
    fn test_inside_window() {
        let (checker, now) = fixed();
        assert!(checker.is_currently_valid(now - Duration::days(1), now + Duration::days(1)));
    }

    #[test]
    fn test_not_yet_valid() {
        let (checker, now) = fixed();
        assert!(!checker.is_currently_valid(now + Duration::days(1), now + Duration::days(2)));
        assert!(matches!(
            checker.check(now + Duration::days(1), now + Duration::days(2)),
            Err(ValidityError::NotYetValid { .. })
        ));
    }

    #[test]
    fn test_expired() {
        let (checker, now) = fixed();
        assert!(!checker.is_currently_valid(now - Duration::days(2), now - Duration::days(1)));
        assert!(matches!(
            checker.check(now - Duration::days(2), now - Duration::days(1)),
            Err(ValidityError::Expired { .. })
        ));
    }

    #[test]
    fn test_bounds_inclusive() {
        let (checker, now) = fixed();
        assert!(checker.is_currently_valid(now, now));
    }

    #[test]
    fn test_inverted_window() {
        let (checker, now) = fixed();
        assert!(!checker.is_currently_valid(now + Duration::days(1), now - Duration::days(1)));
    }

    #[test]
    fn test_system_clock() {
        let checker = ValidityChecker::default();
        let now = Utc::now();
        assert!(checker.is_currently_valid(now - Duration::days(1), now + Duration::days(1)));
    }
}
