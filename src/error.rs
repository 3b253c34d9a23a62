//! Crate & protocol level errors.
//!
//! This module provides the top-level error types for the stratomq broker
//! core.
//!
//! # Error Hierarchy
//!
//! The crate uses a two-layer error hierarchy:
//!
//! ## Protocol Layer (`crate::error`)
//!
//! - [`Error`]: connection and event framing errors
//!
//! ## Cluster Layer (`crate::cluster::error`)
//!
//! - [`ClusterError`]: control-plane errors (leadership, ledger, queue
//!   assignment)
//! - [`ClusterErrorCode`]: wire codes surfaced to requesters
//!
//! ## Conversion
//!
//! [`ClusterError`] can be converted to [`Error`] via a `From` impl,
//! allowing control-plane errors to propagate through the protocol layer.
//!
//! Parse failures inside the event iterators are *not* errors in this
//! sense: they are returned as small status enums by the iterators
//! themselves, and the offending event is dropped by the caller.
//!
//! [`ClusterError`]: crate::cluster::ClusterError
//! [`ClusterErrorCode`]: crate::cluster::ClusterErrorCode

use bytes::Bytes;
use std::{io, result};
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Protocol and connection level errors.
///
/// These are low-level errors that occur during:
/// - Network I/O operations
/// - Event framing and control message decoding
/// - Connection management
///
/// For control-plane errors, see [`crate::cluster::ClusterError`].
#[derive(Debug, ThisError)]
pub enum Error {
    /// An error in the network.
    #[error("IO error: {0:?}")]
    IoError(io::ErrorKind),

    /// Could not decode the data.
    #[error("Decoding error: invalid data ({} bytes)", .0.len())]
    DecodingError(Bytes),

    /// Missing data or connection closed.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::IoError(a), Error::IoError(b)) => a == b,
            (Error::DecodingError(a), Error::DecodingError(b)) => a == b,
            (Error::MissingData(a), Error::MissingData(b)) => a == b,
            (Error::Config(a), Error::Config(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e.kind())
    }
}

impl From<crate::cluster::ClusterError> for Error {
    fn from(e: crate::cluster::ClusterError) -> Self {
        use crate::cluster::ClusterError;
        match e {
            ClusterError::Io(io_err) => Error::IoError(io_err.kind()),
            other => Error::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_io_error() {
        let err = Error::IoError(io::ErrorKind::ConnectionRefused);
        assert_eq!(err, Error::IoError(io::ErrorKind::ConnectionRefused));
    }

    #[test]
    fn test_error_decoding_error() {
        let data = Bytes::from("bad data");
        let err = Error::DecodingError(data.clone());
        assert_eq!(err, Error::DecodingError(data));
    }

    #[test]
    fn test_error_display() {
        let err = Error::MissingData("connection closed".to_string());
        let display = format!("{}", err);
        assert!(display.contains("Missing data"));
        assert!(display.contains("connection closed"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err: Error = io_err.into();
        assert_eq!(err, Error::IoError(io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(Error::MissingData("test".to_string()));
        assert!(err.to_string().contains("Missing data"));
    }
}
