//! Error types for the storage layer.

use std::path::PathBuf;

use skywatch_protocol::ProtocolError;

/// Errors raised while reading or writing history buckets.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The bucket file exists but could not be parsed.
    ///
    /// The cache degrades to an empty bucket when it sees this; direct
    /// callers of the file store decide for themselves.
    #[error("bucket {path} is corrupt: {source}")]
    CorruptData {
        path: PathBuf,
        #[source]
        source: ProtocolError,
    },

    /// Sessions could not be serialized.
    #[error("failed to encode bucket {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: ProtocolError,
    },

    /// Filesystem failure on read, write, fsync, or rename.
    #[error("{context} {path}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A name that does not follow the bucket naming scheme.
    #[error("not a history bucket filename: {0}")]
    InvalidFilename(String),
}

impl StoreError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
