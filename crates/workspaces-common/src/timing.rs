//! Requeue cadence shared by every controller

use std::time::Duration;

/// Short backoff used while sub-resources converge or after a write conflict
pub const POLL_REQUEUE_DELAY: Duration = Duration::from_millis(200);

/// Backoff used while waiting on user remediation or on referencing objects to disappear
pub const LONG_REQUEUE_DELAY: Duration = Duration::from_secs(60);

/// Interval between idle probes of a running workspace
pub const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Backoff for errors that are neither conflicts nor policy failures
pub const DEFAULT_ERROR_REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// Requeue delays carried by each controller context.
///
/// Defaults match the constants above; the operator binary overrides them
/// from its command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileTiming {
    /// Delay for short polling while sub-resources converge
    pub poll: Duration,
    /// Delay while blocked on user action or on referencing objects
    pub long: Duration,
    /// Delay between idle checks
    pub idle_check_interval: Duration,
    /// Delay after an unclassified error
    pub error_backoff: Duration,
}

impl Default for ReconcileTiming {
    fn default() -> Self {
        Self {
            poll: POLL_REQUEUE_DELAY,
            long: LONG_REQUEUE_DELAY,
            idle_check_interval: IDLE_CHECK_INTERVAL,
            error_backoff: DEFAULT_ERROR_REQUEUE_DELAY,
        }
    }
}
