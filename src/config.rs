//! Manager configuration.

use std::time::Duration;

/// Default capacity of the broadcast channel in
/// [`LocalEventBus`](crate::events::LocalEventBus).
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default bound on how long `leave_cluster` waits for aborted executions
/// to wind down before clearing state.
pub const DEFAULT_LEAVE_ABORT_TIMEOUT_MS: u64 = 5_000;

/// Configuration for a clustering cache job manager.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// How long `leave_cluster` waits for this instance's in-flight
    /// executions to acknowledge cancellation. Leaving proceeds either
    /// way once the bound elapses.
    pub leave_abort_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            leave_abort_timeout: Duration::from_millis(DEFAULT_LEAVE_ABORT_TIMEOUT_MS),
        }
    }
}

impl ManagerConfig {
    /// Sets the leave-time abort wait bound.
    pub fn with_leave_abort_timeout(mut self, timeout: Duration) -> Self {
        self.leave_abort_timeout = timeout;
        self
    }
}
