//! Bridge behavior knobs.

use std::time::Duration;

/// Configuration for a [`crate::NodeBridge`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Deadline applied to each call, measured from the moment it is issued.
    /// The clock covers queueing time as well as wire time.
    pub call_timeout: Duration,
    /// Bounded depth of each protocol channel's call queue. Issuers block
    /// (asynchronously) when the queue is full.
    pub queue_depth: usize,
    /// Whether to redial the node after a lost connection.
    pub reconnect: bool,
    /// First reconnect delay; doubles per failed attempt.
    pub initial_backoff: Duration,
    /// Ceiling for the reconnect delay.
    pub max_backoff: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            queue_depth: 64,
            reconnect: true,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fast timeouts and tight backoff for tests.
    pub fn for_testing() -> Self {
        Self {
            call_timeout: Duration::from_millis(500),
            queue_depth: 16,
            reconnect: true,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }
}
