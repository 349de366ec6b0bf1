//! Production-tracking synchronization for work files and publishes.
//!
//! [`Synchronizer`] wraps a [`FileManager`](nox_files::FileManager) and a
//! [`TrackingService`](nox_tracking::TrackingService). It works out which
//! shot or asset a file belongs to from the project layout
//! ([`PathConvention`]), names and registers work files, and publishes them
//! for review.
//!
//! ```no_run
//! # use nox_files::{FileManager, Host, SaveOptions};
//! # use nox_pipeline::Synchronizer;
//! # fn run<H: Host>(files: FileManager<H>, tracking: nox_tracking::TrackingHandle) {
//! let config = nox_config::Config::default();
//! let mut sync = Synchronizer::new(files, tracking, config);
//! let result = sync.save_work_file(SaveOptions::default());
//! println!("{}", result.message());
//! # }
//! ```

mod context;
pub mod convention;
pub mod error;
mod publish;
mod sync;
mod work;

pub use crate::context::TrackingContext;
pub use crate::convention::{Location, PathConvention, StudioConvention};
pub use crate::error::ErrorKind;
pub use crate::publish::PublishOptions;
pub use crate::sync::Synchronizer;
pub use crate::work::WORK_FILE_TYPE;
