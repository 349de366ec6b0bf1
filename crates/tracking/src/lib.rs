//! Production-tracking service client.
//!
//! The tracking service is the studio's ledger of shots, assets, tasks and
//! the files artists produce for them. This crate models its records
//! ([`Record`], [`EntityRef`], [`Filter`]) and exposes the three calls the
//! pipeline makes through [`TrackingService`]. The REST transport lives
//! behind the `http` feature; tests use [`MockTracking`] from the `mock`
//! feature instead.

pub mod error;
mod record;
pub mod service;

pub use crate::record::{EntityRef, EntityType, Fields, Filter, Order, Record, Relation};
#[cfg(any(test, feature = "mock"))]
pub use crate::service::MockTracking;
pub use crate::service::{RetryPolicy, RetryingService, TrackingService};
use std::sync::Arc;

pub type TrackingHandle = Arc<dyn TrackingService + Send + Sync>;

/// Connect to the configured REST service, retrying transient failures.
///
/// # Errors
/// [`NotConfigured`](error::ErrorKind::NotConfigured) when the URL or
/// script credentials are missing.
#[cfg(feature = "http")]
pub fn connect(settings: &nox_config::TrackingSettings) -> error::Result<TrackingHandle> {
    let http: TrackingHandle = Arc::new(service::HttpService::new(settings)?);
    Ok(Arc::new(RetryingService::new(http, RetryPolicy::from(settings))))
}
