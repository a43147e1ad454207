//! Error types for the PAM engine.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for PAM operations.
///
/// None of these are fatal to the owning raster: load and save failures
/// degrade to "metadata not persisted" and the in-memory state stays usable.
#[derive(Error, Debug)]
pub enum Error {
    /// Sidecar document does not exist (no metadata persisted yet)
    #[error("Sidecar not found: {0}")]
    NotFound(PathBuf),

    /// Malformed sidecar document
    #[error("Failed to parse {}: {message}", path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<memory>".into()))]
    Parse {
        path: Option<PathBuf>,
        message: String,
    },

    /// Element text or attribute that does not hold a valid value
    #[error("Invalid value for <{element}>: {value:?}")]
    InvalidValue { element: String, value: String },

    /// Sidecar could not be written (permissions, space, I/O)
    #[error("Unable to save auxiliary information in {}: {reason}", path.display())]
    WriteFailed { path: PathBuf, reason: String },

    /// Band-level clone requested between datasets with different band counts
    #[error("Cannot clone band metadata: source has {source_bands} bands, destination has {dest_bands}")]
    InvalidCloneRequest {
        source_bands: usize,
        dest_bands: usize,
    },

    /// Type mismatch when reading or writing a typed value
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Band number out of range (bands are numbered from 1)
    #[error("Band {index} out of range (count: {count})")]
    BandOutOfRange { index: usize, count: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Proxy index (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a parse error not tied to a file.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            path: None,
            message: msg.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(element: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            element: element.into(),
            value: value.into(),
        }
    }

    /// Attach a file path to a parse error that has none.
    pub fn with_path(self, file: impl Into<PathBuf>) -> Self {
        match self {
            Self::Parse { path: None, message } => Self::Parse {
                path: Some(file.into()),
                message,
            },
            other => other,
        }
    }

    /// True for errors that mean "nothing persisted yet" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for PAM operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::BandOutOfRange { index: 5, count: 3 };
        assert!(e.to_string().contains("5"));
        assert!(e.to_string().contains("3"));

        let e = Error::parse("unexpected end").with_path("/tmp/a.tif.aux.xml");
        let msg = e.to_string();
        assert!(msg.contains("a.tif.aux.xml"));
        assert!(msg.contains("unexpected end"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_with_path_keeps_existing() {
        let e = Error::Parse {
            path: Some("first".into()),
            message: "x".into(),
        }
        .with_path("second");
        match e {
            Error::Parse { path, .. } => assert_eq!(path, Some(PathBuf::from("first"))),
            _ => panic!("expected parse error"),
        }
        assert!(Error::NotFound("a".into()).is_not_found());
    }
}
