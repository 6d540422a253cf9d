//! Error types for semstore operations.
//!
//! Every variant belongs to exactly one [`ErrorKind`]. Callers that need to
//! decide on remediation (retry, fix configuration, report bad input) should
//! branch on [`Error::kind`] rather than on individual variants.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using semstore's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid embedding backend settings, dimensionality mismatch.
    Configuration,
    /// Malformed caller request, rejected before any I/O.
    Input,
    /// The targeted collection does not exist.
    NotFound,
    /// Persistence or index operation failed.
    Storage,
    /// A backend was temporarily unreachable or the operation timed out.
    TransientIo,
}

/// Errors that can occur during semstore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Embedding backend or store misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Vector dimension mismatch between collection and input.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Malformed request.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid filter expression.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// IO error during storage operations.
    #[error("io error: {0}")]
    IoError(String),

    /// WAL corruption detected.
    #[error("WAL corrupted: {0}")]
    WalCorrupted(String),

    /// Index could not be built or loaded.
    #[error("index error: {0}")]
    IndexError(String),

    /// Embedding backend returned an unusable response.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Backend temporarily unreachable.
    #[error("transient io error: {0}")]
    Transient(String),

    /// Operation exceeded the configured timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// An inner error annotated with the collection and operation it came from.
    #[error("{operation} on collection '{collection}' failed: {source}")]
    Storage {
        collection: String,
        operation: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns the category of this error. Wrapped errors report the kind of
    /// their innermost cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::DimensionMismatch { .. } => ErrorKind::Configuration,
            Error::InvalidInput(_) | Error::InvalidFilter(_) => ErrorKind::Input,
            Error::CollectionNotFound(_) => ErrorKind::NotFound,
            Error::IoError(_) | Error::WalCorrupted(_) | Error::IndexError(_) => {
                ErrorKind::Storage
            }
            Error::Embedding(_) => ErrorKind::Storage,
            Error::Transient(_) | Error::Timeout(_) => ErrorKind::TransientIo,
            Error::Storage { source, .. } => source.kind(),
        }
    }

    /// Returns true if retrying the same operation later might succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }

    /// Wraps this error with collection and operation context.
    pub fn in_collection(self, collection: &str, operation: impl Into<String>) -> Self {
        Error::Storage {
            collection: collection.to_string(),
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// Maps a std IO error, classifying interruptions and timeouts as transient.
    pub(crate) fn from_io(context: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        match err.kind() {
            IoKind::TimedOut | IoKind::Interrupted | IoKind::WouldBlock => {
                Error::Transient(format!("{}: {}", context, err))
            }
            _ => Error::IoError(format!("{}: {}", context, err)),
        }
    }
}

/// Adds collection context to fallible results.
pub trait ResultExt<T> {
    /// Wraps the error, if any, with the collection and operation.
    fn in_collection(self, collection: &str, operation: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn in_collection(self, collection: &str, operation: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.in_collection(collection, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DimensionMismatch {
            expected: 384,
            got: 512,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, got 512");
    }

    #[test]
    fn test_wrapped_error_keeps_kind() {
        let err = Error::Timeout(Duration::from_secs(1)).in_collection("profiles", "write");
        assert_eq!(err.kind(), ErrorKind::TransientIo);
        assert!(err.is_transient());

        let err = Error::DimensionMismatch {
            expected: 3,
            got: 4,
        }
        .in_collection("profiles", "write document abc");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "write document abc on collection 'profiles' failed: dimension mismatch: expected 3, got 4"
        );
    }

    #[test]
    fn test_io_classification() {
        let err = Error::from_io("read", std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(err.is_transient());

        let err = Error::from_io(
            "read",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
