//! Timing and size limits shared by the reconciler, the registry, and
//! the archiving sweep.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

/// Configuration for session reconciliation.
///
/// Everything here is supplied from outside (flags, environment); the
/// defaults match a feed polled every few seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Longest gap between two detections of the same drone that still
    /// counts as one session. Also the idle time after which the sweep
    /// archives a session.
    ///
    /// Default: 10 seconds.
    pub inactive_timeout: Duration,

    /// Maximum number of points kept in a session trace. Older points
    /// are dropped first.
    ///
    /// Default: 500.
    pub max_trace_length: usize,

    /// How often the archiving sweep runs. `Duration::ZERO` disables the
    /// periodic sweep (shutdown still archives everything).
    ///
    /// Default: 15 seconds.
    pub archive_check_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactive_timeout: Duration::from_secs(10),
            max_trace_length: 500,
            archive_check_interval: Duration::from_secs(15),
        }
    }
}

impl SessionConfig {
    /// Fix out-of-range values so the config is safe to use.
    ///
    /// - `max_trace_length` is at least 1; a zero bound would erase every
    ///   trace on merge.
    pub fn validated(mut self) -> Self {
        if self.max_trace_length == 0 {
            warn!("max_trace_length of 0 would drop every trace point, using 1");
            self.max_trace_length = 1;
        }
        self
    }

    /// The inactivity timeout as a chrono delta, for wall-clock arithmetic.
    pub fn timeout_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.inactive_timeout).unwrap_or(TimeDelta::MAX)
    }

    /// `true` if more than the inactivity timeout separates `last_seen`
    /// from `now`.
    pub fn is_expired(&self, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_seen) > self.timeout_delta()
    }

    /// `true` if `a` and `b` are at most one inactivity timeout apart,
    /// in either order.
    pub fn within_window(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        a.signed_duration_since(b).abs() <= self.timeout_delta()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.inactive_timeout, Duration::from_secs(10));
        assert_eq!(config.archive_check_interval, Duration::from_secs(15));
        assert_eq!(config.max_trace_length, 500);
    }

    #[test]
    fn test_validated_clamps_zero_trace_length() {
        let config = SessionConfig {
            max_trace_length: 0,
            ..SessionConfig::default()
        }
        .validated();
        assert_eq!(config.max_trace_length, 1);
    }

    #[test]
    fn test_is_expired_is_strictly_greater() {
        let config = SessionConfig::default();
        assert!(!config.is_expired(t(0), t(10)));
        assert!(config.is_expired(t(0), t(10) + TimeDelta::milliseconds(1)));
    }

    #[test]
    fn test_within_window_is_symmetric() {
        let config = SessionConfig::default();
        assert!(config.within_window(t(0), t(5)));
        assert!(config.within_window(t(5), t(0)));
        assert!(config.within_window(t(0), t(10)));
        assert!(!config.within_window(t(11), t(0)));
    }
}
