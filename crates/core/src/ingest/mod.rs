pub mod market;
pub mod news;
pub mod types;

use reqwest::StatusCode;
use std::time::Duration;

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) const BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// `unit * 2^(attempt - 1)`, capped at `unit * 32`.
pub(crate) fn backoff_for(attempt: u32, unit: Duration) -> Duration {
    unit * (1u32 << attempt.saturating_sub(1).min(5))
}

pub(crate) fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_string_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_for(1, BACKOFF_UNIT), Duration::from_secs(1));
        assert_eq!(backoff_for(2, BACKOFF_UNIT), Duration::from_secs(2));
        assert_eq!(backoff_for(3, BACKOFF_UNIT), Duration::from_secs(4));
        assert_eq!(backoff_for(40, BACKOFF_UNIT), Duration::from_secs(32));
        assert_eq!(backoff_for(2, Duration::from_millis(5)), Duration::from_millis(10));
    }

    #[test]
    fn retries_only_throttling_and_server_errors() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }
}
