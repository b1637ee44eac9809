use std::time::Duration;

/// Default number of concurrent outbound calls.
pub const DEFAULT_CAPACITY: usize = 10;

/// Dispatch queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of tasks awaiting the external service at once.
    pub capacity: usize,

    /// Bound on a single outbound call. A call that exceeds it is counted as
    /// failed and frees its slot.
    pub call_timeout: Option<Duration>,

    /// How often queue depth is logged while tasks are waiting.
    pub monitor_interval: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            call_timeout: Some(Duration::from_secs(60)),
            monitor_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity, ..Self::default() }
    }
}
