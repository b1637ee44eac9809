use std::env;
use std::time::Duration;

use chrono_tz::Tz;
use probe_dispatch::QueueConfig;

const FIRST_JOB_REQUEST_MS: u64 = 180_000;
const TIME_JITTER_MS: u64 = 86_400_000;

/// Importer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// When false, every load is a no-op.
    pub import_enabled: bool,

    pub queue: QueueConfig,

    /// Delay the host waits after start-up before the first job request.
    pub first_job_request_delay: Duration,

    /// Calendar used to decide which dates "yesterday" and "today" are.
    pub timezone: Tz,

    /// Upper bound of the random backwards shift applied to each run's base
    /// instant.
    pub time_jitter: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            import_enabled: true,
            queue: QueueConfig::default(),
            first_job_request_delay: Duration::from_millis(FIRST_JOB_REQUEST_MS),
            timezone: Tz::UTC,
            time_jitter: Duration::from_millis(TIME_JITTER_MS),
        }
    }
}

impl Config {
    /// Read configuration from the environment, falling back to defaults for
    /// unset or unparseable values.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let queue = QueueConfig {
            capacity: env_usize(var("MAX_NUM_OF_REQUESTING"), defaults.queue.capacity),
            call_timeout: env_millis(var("PROBE_CALL_TIMEOUT_MS"), defaults.queue.call_timeout),
            monitor_interval: env_millis(
                var("QUEUE_MONITOR_INTERVAL_MS"),
                defaults.queue.monitor_interval,
            ),
        };
        let timezone = var("TIMEZONE")
            .and_then(|value| value.trim().parse::<Tz>().ok())
            .unwrap_or(defaults.timezone);

        Self {
            import_enabled: env_bool(var("IMPORT"), defaults.import_enabled),
            queue,
            first_job_request_delay: Duration::from_millis(env_u64(
                var("FIRST_JOB_REQUEST_TIME"),
                FIRST_JOB_REQUEST_MS,
            )),
            timezone,
            time_jitter: Duration::from_millis(env_u64(
                var("SIMULATION_TIME_JITTER_MS"),
                TIME_JITTER_MS,
            )),
        }
    }
}

fn env_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_u64(value: Option<String>, default: u64) -> u64 {
    value.and_then(|value| value.trim().parse::<u64>().ok()).unwrap_or(default)
}

fn env_usize(value: Option<String>, default: usize) -> usize {
    value.and_then(|value| value.trim().parse::<usize>().ok()).unwrap_or(default)
}

// milliseconds, with zero switching the setting off
fn env_millis(value: Option<String>, default: Option<Duration>) -> Option<Duration> {
    match value.and_then(|value| value.trim().parse::<u64>().ok()) {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => default,
    }
}
