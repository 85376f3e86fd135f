//! Retry policy and backoff for RPC calls.
//!
//! The retryable set is a *policy* decision, not a transport property:
//! deadline-exceeded is retryable so a single slow replica does not consume
//! the whole call budget, while the overall deadline computed by
//! [`total_timeout`] still bounds end-to-end time.

use std::time::Duration;

use plexrpc_core::Code;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default configuration values for retries.
pub mod defaults {
    use std::time::Duration;

    /// Delay before the first retry attempt.
    pub const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

    /// Upper bound on the delay between attempts.
    pub const MAX_BACKOFF: Duration = Duration::from_millis(300);

    /// Attempt budget including the original attempt. One attempt means
    /// retries are disabled.
    pub const ATTEMPTS: u32 = 1;
}

/// Static retry configuration, parsed from a configuration document.
///
/// # Example
///
/// ```
/// use plexrpc_client::config::RetryConfig;
///
/// let config = RetryConfig::from_json(r#"{ "attempts": 3 }"#).unwrap();
/// assert_eq!(config.attempts(), 3);
///
/// // attempts < 1 is a configuration fault, rejected up front
/// assert!(RetryConfig::from_json(r#"{ "attempts": 0 }"#).is_err());
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    attempts: u32,
}

fn default_attempts() -> u32 {
    defaults::ATTEMPTS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: defaults::ATTEMPTS,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given attempt budget.
    pub fn new(attempts: u32) -> Result<Self, ConfigError> {
        let config = Self { attempts };
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON configuration document and validate.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(document).map_err(ConfigError::InvalidDocument)?;
        config.validate()?;
        Ok(config)
    }

    /// Maximum number of attempts, including the original one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.attempts < 1 {
            return Err(ConfigError::InvalidAttempts(self.attempts));
        }
        Ok(())
    }
}

/// Classify a terminal status code as retryable.
///
/// The set is fixed: cancelled, unknown, deadline-exceeded, aborted,
/// internal and unavailable; everything else fails the call immediately.
pub fn is_retryable(code: Code) -> bool {
    matches!(
        code,
        Code::Cancelled
            | Code::Unknown
            | Code::DeadlineExceeded
            | Code::Aborted
            | Code::Internal
            | Code::Unavailable
    )
}

/// Ceiling for the end-to-end deadline of a retried call: with every attempt
/// timing out, the call still finishes within `per_attempt * attempts`.
pub fn total_timeout(per_attempt: Duration, attempts: u32) -> Duration {
    per_attempt.saturating_mul(attempts)
}

/// Jitter-free exponential backoff between retry attempts.
///
/// The delay is held as an integer count of milliseconds so repeated
/// doubling never accumulates floating-point drift; the cap is applied
/// before the multiply, so the counter cannot overflow.
#[derive(Clone, Debug)]
pub struct RetryBackoff {
    initial_ms: u64,
    max_ms: u64,
    current_ms: Option<u64>,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::with_bounds(defaults::INITIAL_BACKOFF, defaults::MAX_BACKOFF)
    }
}

impl RetryBackoff {
    /// Create a backoff with the default bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backoff with explicit initial and maximum delays.
    pub fn with_bounds(initial: Duration, max: Duration) -> Self {
        let initial_ms = initial.as_millis() as u64;
        let max_ms = (max.as_millis() as u64).max(initial_ms);
        Self {
            initial_ms,
            max_ms,
            current_ms: None,
        }
    }

    /// The delay to sleep before the next attempt.
    ///
    /// The first call returns the initial delay; each subsequent call
    /// returns double the previous value, capped at the maximum.
    pub fn next_attempt_delay(&mut self) -> Duration {
        let next_ms = match self.current_ms {
            None => self.initial_ms,
            Some(current) if current > self.max_ms / 2 => self.max_ms,
            Some(current) => current * 2,
        };
        self.current_ms = Some(next_ms);
        Duration::from_millis(next_ms)
    }

    /// Return to the pre-first-attempt state.
    pub fn reset(&mut self) {
        self.current_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        assert_eq!(RetryConfig::default().attempts(), 1);
    }

    #[test]
    fn test_retry_config_from_json_default_attempts() {
        let config = RetryConfig::from_json("{}").unwrap();
        assert_eq!(config.attempts(), 1);
    }

    #[test]
    fn test_retry_config_rejects_zero_attempts() {
        assert!(matches!(
            RetryConfig::new(0),
            Err(ConfigError::InvalidAttempts(0))
        ));
    }

    #[test]
    fn test_retry_config_rejects_unknown_fields() {
        assert!(RetryConfig::from_json(r#"{ "atempts": 3 }"#).is_err());
    }

    #[test]
    fn test_is_retryable_fixed_set() {
        let retryable = [
            Code::Cancelled,
            Code::Unknown,
            Code::DeadlineExceeded,
            Code::Aborted,
            Code::Internal,
            Code::Unavailable,
        ];
        for code in retryable {
            assert!(is_retryable(code), "{code} must be retryable");
        }

        let non_retryable = [
            Code::Ok,
            Code::InvalidArgument,
            Code::NotFound,
            Code::AlreadyExists,
            Code::PermissionDenied,
            Code::ResourceExhausted,
            Code::FailedPrecondition,
            Code::OutOfRange,
            Code::Unimplemented,
            Code::DataLoss,
            Code::Unauthenticated,
        ];
        for code in non_retryable {
            assert!(!is_retryable(code), "{code} must not be retryable");
        }
    }

    #[test]
    fn test_total_timeout() {
        assert_eq!(
            total_timeout(Duration::from_millis(2000), 3),
            Duration::from_millis(6000)
        );
        // Saturates instead of overflowing.
        assert_eq!(total_timeout(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff =
            RetryBackoff::with_bounds(Duration::from_millis(10), Duration::from_millis(300));

        assert_eq!(backoff.next_attempt_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_attempt_delay(), Duration::from_millis(20));
        assert_eq!(backoff.next_attempt_delay(), Duration::from_millis(40));
        assert_eq!(backoff.next_attempt_delay(), Duration::from_millis(80));
        assert_eq!(backoff.next_attempt_delay(), Duration::from_millis(160));
        // 320 would exceed the cap; it pins to the cap instead.
        assert_eq!(backoff.next_attempt_delay(), Duration::from_millis(300));
        assert_eq!(backoff.next_attempt_delay(), Duration::from_millis(300));
    }

    #[test]
    fn test_backoff_reset_reproduces_initial_delay() {
        let mut backoff = RetryBackoff::new();
        backoff.next_attempt_delay();
        backoff.next_attempt_delay();

        backoff.reset();
        assert_eq!(backoff.next_attempt_delay(), defaults::INITIAL_BACKOFF);
    }

    #[test]
    fn test_backoff_cap_below_initial_is_lifted_to_initial() {
        let mut backoff =
            RetryBackoff::with_bounds(Duration::from_millis(100), Duration::from_millis(10));
        assert_eq!(backoff.next_attempt_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_attempt_delay(), Duration::from_millis(100));
    }
}
