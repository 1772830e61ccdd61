//! Custom error types for the serializer library.
//!
//! This module defines the primary error type, `WriterError`, shared by every
//! serializer in the crate. Using the `thiserror` crate, it provides a
//! centralized and consistent way to classify the failure modes of
//! document-stream processing:
//!
//! - **Structural violations** (`Malformed`, `MissingField`,
//!   `UnknownDescriptor`, `DuplicateDescriptor`, `DuplicateStream`): the
//!   document stream contradicts itself. These are fatal for the current run
//!   and are propagated to the caller rather than silently producing a
//!   corrupt file.
//! - **`DuplicateRun`**: the SPEC writer refuses to append a scan block for a
//!   run uid that is already present in the target file (stop-document replay
//!   protection).
//! - **External-resource errors** (`UnsupportedResource`, `UnknownResource`):
//!   an externally-stored array cannot be dereferenced. These abort only the
//!   affected detector group of a NeXus file, never the whole file.
//! - **`Io` / `Hdf5`**: wrapped backend failures, created seamlessly via
//!   `#[from]` so the `?` operator works throughout the crate.
//!
//! Missing *optional* enrichment (convention-named NeXus groups, absent
//! baseline keys) is not an error at all: those paths log a warning and skip.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type WriterResult<T> = std::result::Result<T, WriterError>;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("malformed {kind} document: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} document is missing required field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("event references unknown descriptor '{0}'")]
    UnknownDescriptor(String),

    #[error("descriptor uid '{0}' was already registered for this run")]
    DuplicateDescriptor(String),

    #[error("stream '{0}' already has a descriptor in this run")]
    DuplicateStream(String),

    #[error("run '{uid}' is already present in {path:?}")]
    DuplicateRun { uid: String, path: PathBuf },

    #[error("unsupported external resource spec '{0}'")]
    UnsupportedResource(String),

    #[error("datum references unknown resource '{0}'")]
    UnknownResource(String),

    #[error("no finalized run is available to write")]
    NoRun,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "storage_hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WriterError::UnknownDescriptor("abc123".to_string());
        assert_eq!(
            err.to_string(),
            "event references unknown descriptor 'abc123'"
        );
    }

    #[test]
    fn test_duplicate_run_display() {
        let err = WriterError::DuplicateRun {
            uid: "deadbeef".into(),
            path: PathBuf::from("scan.dat"),
        };
        assert!(err.to_string().contains("deadbeef"));
        assert!(err.to_string().contains("scan.dat"));
    }
}
