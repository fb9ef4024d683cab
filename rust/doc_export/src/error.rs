//! Error types for the export pipeline.

use std::io;
use thiserror::Error;

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The requested export format is not implemented.
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// The export was cancelled at a checkpoint.
    #[error("export cancelled")]
    Cancelled,

    /// A single diagram could not be converted.
    #[error("diagram {id}: {reason}")]
    Diagram { id: String, reason: String },

    /// A single content node could not be converted.
    #[error("content node: {0}")]
    Node(String),

    /// The platform print facility reported a failure.
    #[error("print failed: {0}")]
    Print(String),

    /// A whole stage failed; wraps the original cause.
    #[error("export failed during {stage}: {source}")]
    ExportFailed {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl Error {
    /// Wraps `self` as a stage failure. Cancellation passes through untouched.
    pub fn during(self, stage: &'static str) -> Error {
        match self {
            Error::Cancelled | Error::ExportFailed { .. } | Error::UnsupportedFormat(_) => self,
            other => Error::ExportFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Encoding(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_stage_failures_but_not_cancellation() {
        let err = Error::Node("bad".into()).during("generating");
        assert!(matches!(err, Error::ExportFailed { stage: "generating", .. }));
        assert_eq!(
            err.to_string(),
            "export failed during generating: content node: bad"
        );

        let err = Error::Cancelled.during("generating");
        assert!(err.is_cancelled());
    }

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
