//! Contains the main error type for the library.
use thiserror::Error;

/// The main error type for the library. Each module has its own error type that is contained
/// by this error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unknown controller: {0}")]
    UnknownController(String),
    #[error(transparent)]
    BitTiming(#[from] crate::bit_timing::Error),
}
