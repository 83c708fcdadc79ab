//! Relay tuning.

use std::time::Duration;

/// Relay tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Maximum entries claimed and dispatched per batch.
    pub max_in_flight: usize,
    /// Idle wait between polls when nothing was claimable.
    pub poll_interval: Duration,
    /// Upper bound on a single delivery attempt.
    pub dispatch_timeout: Duration,
    /// How long a claimed entry stays invisible to other claims.
    pub lease: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            poll_interval: Duration::from_millis(250),
            dispatch_timeout: Duration::from_secs(5),
            lease: Duration::from_secs(30),
        }
    }
}
