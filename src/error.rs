//! Command-line Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Configuration file missing or malformed
    #[display("could not load configuration")]
    Config,
    /// Tracking service not configured or unreachable
    #[display("could not connect to the tracking service")]
    Tracking,
    /// Neither the flags nor the path identify a shot or asset
    #[display("no tracking context for {}", _0.display())]
    NoContext(#[error(not(source))] PathBuf),
    #[display("invalid argument: {_0}")]
    InvalidArgument(#[error(not(source))] String),
    #[display("lookup failed")]
    Lookup,
    /// A result could not be rendered for printing
    #[display("could not render output")]
    Output,
}
