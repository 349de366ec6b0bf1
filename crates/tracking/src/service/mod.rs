//! Tracking service trait and implementations.
//!
//! The pipeline only ever needs three calls from the production-tracking
//! service: find a single record, create one, and update one by id. Each is
//! a point-in-time request with no transactions or batching.
//!
//! Implementations:
//! - [`HttpService`]: the REST API, behind the `http` feature.
//! - [`RetryingService`]: wraps any service with bounded exponential backoff.
//! - [`MockTracking`]: in-memory records for tests, behind the `mock` feature.

#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod retry;

#[cfg(feature = "http")]
pub use self::http::HttpService;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockTracking;
pub use self::retry::{RetryPolicy, RetryingService};
use crate::error::Result;
use crate::record::{EntityType, Fields, Filter, Order, Record};

/// Unified interface to the production-tracking service.
///
/// Calls block the current thread until the service answers or the
/// transport gives up.
///
/// # Examples
///
/// ```
/// use nox_tracking::error::Result;
/// use nox_tracking::{EntityType, Filter, TrackingService};
///
/// fn shot_id(service: &dyn TrackingService, code: &str) -> Result<Option<i64>> {
///     let shot = service.find_one(EntityType::Shot, &[Filter::is("code", code)], &["code"], &[])?;
///     Ok(shot.map(|record| record.id))
/// }
/// ```
pub trait TrackingService {
    /// Identifies the service in logs.
    fn name(&self) -> &str;

    /// The first record of `entity_type` matching every filter, after
    /// sorting by `order`.
    ///
    /// Only the requested `fields` (plus the id) are guaranteed to be
    /// populated. Dotted fields (`step.Step.short_name`) read across links.
    fn find_one(
        &self,
        entity_type: EntityType,
        filters: &[Filter],
        fields: &[&str],
        order: &[Order],
    ) -> Result<Option<Record>>;

    /// Create a record and return it with its new id.
    fn create(&self, entity_type: EntityType, data: &Fields) -> Result<Record>;

    /// Overwrite the given fields of an existing record.
    fn update(&self, entity_type: EntityType, id: i64, data: &Fields) -> Result<Record>;
}
