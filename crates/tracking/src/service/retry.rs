//! Retrying tracking service.
//!
//! Wraps another service and repeats calls that failed with a retryable
//! error, sleeping with exponential backoff between attempts. Non-retryable
//! errors (bad credentials, rejected requests) are returned immediately.
//!
//! Creates are only repeated when the service never processed the request
//! (see [`ErrorKind::is_unprocessed`]). A create that timed out may already
//! exist on the service, and sending it again would add a duplicate record.

use crate::error::{ErrorKind, Result};
use crate::record::{EntityType, Fields, Filter, Order, Record};
use crate::{TrackingHandle, TrackingService};
use nox_config::TrackingSettings;
use std::thread;
use std::time::Duration;

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}
impl RetryPolicy {
    /// Wait before retry number `attempt` (0 for the first retry).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial = self.initial_backoff.as_millis() as f64;
        let base = initial * self.multiplier.powi(attempt as i32);
        Duration::from_millis(base.min(self.max_backoff.as_millis() as f64) as u64)
    }
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}
impl From<&TrackingSettings> for RetryPolicy {
    fn from(settings: &TrackingSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            ..Self::default()
        }
    }
}

/// Retrying decorator around another [`TrackingService`].
#[derive(Clone)]
pub struct RetryingService {
    inner: TrackingHandle,
    policy: RetryPolicy,
}
impl RetryingService {
    pub fn new(inner: TrackingHandle, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn run<T>(
        &self,
        operation: &str,
        retryable: fn(&ErrorKind) -> bool,
        call: impl Fn(&dyn TrackingService) -> Result<T>,
    ) -> Result<T> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match call(self.inner.as_ref()) {
                Ok(value) => return Ok(value),
                Err(err) if retryable(&err) && attempt + 1 < attempts => {
                    let backoff = self.policy.backoff(attempt);
                    tracing::warn!(
                        service = self.inner.name(),
                        operation,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = ?err,
                        "Retrying tracking call"
                    );
                    thread::sleep(backoff);
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }
}

impl TrackingService for RetryingService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn find_one(
        &self,
        entity_type: EntityType,
        filters: &[Filter],
        fields: &[&str],
        order: &[Order],
    ) -> Result<Option<Record>> {
        self.run("find_one", ErrorKind::is_retryable, |service| service.find_one(entity_type, filters, fields, order))
    }

    fn create(&self, entity_type: EntityType, data: &Fields) -> Result<Record> {
        self.run("create", ErrorKind::is_unprocessed, |service| service.create(entity_type, data))
    }

    fn update(&self, entity_type: EntityType, id: i64, data: &Fields) -> Result<Record> {
        self.run("update", ErrorKind::is_retryable, |service| service.update(entity_type, id, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MockTracking;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    #[rstest]
    #[case(0, 200)]
    #[case(1, 400)]
    #[case(2, 800)]
    #[case(5, 5000)]
    fn test_backoff_is_capped(#[case] attempt: u32, #[case] expected_ms: u64) {
        assert_eq!(RetryPolicy::default().backoff(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_recovers_from_transient_failures() {
        let mock = Arc::new(MockTracking::default());
        mock.insert(EntityType::Shot, [("code", json!("SH010"))]);
        mock.fail_next(2, || ErrorKind::Unavailable("connection reset".to_string()));
        let service = RetryingService::new(mock.clone(), fast_policy(3));

        let shot = service.find_one(EntityType::Shot, &[Filter::is("code", "SH010")], &["code"], &[]).unwrap();
        assert!(shot.is_some());
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mock = Arc::new(MockTracking::default());
        mock.fail_next(10, || ErrorKind::Unavailable("timed out".to_string()));
        let service = RetryingService::new(mock.clone(), fast_policy(3));

        let err = service.find_one(EntityType::Shot, &[], &[], &[]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unavailable(_)));
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn test_does_not_retry_rejections() {
        let mock = Arc::new(MockTracking::default());
        mock.fail_next(1, || ErrorKind::Auth);
        let service = RetryingService::new(mock.clone(), fast_policy(5));

        let err = service.create(EntityType::Shot, &Fields::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Auth));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_create_is_not_resent_after_timeout() {
        let mock = Arc::new(MockTracking::default());
        mock.fail_next(1, || ErrorKind::Unavailable("request timed out".to_string()));
        let service = RetryingService::new(mock.clone(), fast_policy(3));

        let err = service.create(EntityType::Version, &Fields::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unavailable(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_create_is_resent_when_refused() {
        let mock = Arc::new(MockTracking::default());
        mock.fail_next(1, || ErrorKind::Refused("HTTP 503".to_string()));
        let service = RetryingService::new(mock.clone(), fast_policy(3));

        let version = service.create(EntityType::Version, &Fields::new()).unwrap();
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.records(EntityType::Version), vec![version]);
    }
}
