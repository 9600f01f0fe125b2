//! Transport-level retry with exponential backoff and jitter.
//!
//! [`BackoffConfig`] controls how transient HTTP errors (429, 5xx) on model
//! calls are retried with increasing delays. The default is no retry; the
//! server picks [`BackoffConfig::interactive()`] because a child is waiting.

use std::time::Duration;

/// Configuration for transport-level retry with exponential backoff and jitter.
///
/// # Example
///
/// ```
/// use clayquest::backend::BackoffConfig;
///
/// let none = BackoffConfig::none();
/// assert_eq!(none.max_retries, 0);
///
/// let interactive = BackoffConfig::interactive();
/// assert_eq!(interactive.max_retries, 2);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of transport retries. Default: 0 (no retry).
    pub max_retries: u32,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to delay after each retry.
    pub multiplier: f64,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Jitter strategy.
    pub jitter: JitterStrategy,

    /// HTTP status codes that trigger retry. Default: `[429, 500, 502, 503, 504, 529]`.
    pub retryable_statuses: Vec<u16>,

    /// Whether to respect `Retry-After` headers from the provider.
    pub respect_retry_after: bool,
}

/// Jitter strategy to spread retries from concurrent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,

    /// Random value in `[0, calculated_delay]`.
    Full,

    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No transport retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// 3 retries, 1s initial, 2x multiplier, 60s max, full jitter.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504, 529],
            respect_retry_after: true,
        }
    }

    /// Conservative retry for interactive use: 2 retries, 500ms initial, 10s max.
    pub fn interactive() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            jitter: JitterStrategy::Equal,
            ..Self::standard()
        }
    }

    /// Calculate the delay for attempt N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::none()
    }
}
