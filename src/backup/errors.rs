//! Backup reader error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for backup file operations.
pub type BackupResult<T> = Result<T, Error>;

/// Errors from unpacking and reading a backup archive.
#[derive(Debug, Error)]
pub enum Error {
    #[error("creating temp directory in {dir:?}: {source}")]
    CreateTempDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("removing temp directory: {0}")]
    RemoveTempDir(#[source] io::Error),

    #[error("opening {path:?}: {source}")]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unpacking {path:?}: {source}")]
    Unpack {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("extracting backup to {dir:?}: {source}")]
    Extract {
        dir: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("extracting root.tar in {dir:?}: {source}")]
    ExtractRoot {
        dir: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("expected a single top-level directory in the backup archive")]
    MissingTopDir,

    #[error("reading {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unmarshalling metadata: {0}")]
    MetadataParse(#[source] serde_json::Error),

    #[error("unsupported backup format version {0}")]
    UnsupportedFormat(i64),

    #[error("counting HA nodes: {0}")]
    CountingHaNodes(#[source] Box<Error>),

    #[error("reading bson: {0}")]
    BsonIo(#[source] io::Error),

    #[error("truncated bson document")]
    TruncatedBson,

    #[error("invalid bson document: {0}")]
    InvalidBson(String),

    #[error("reading machine doc {index}: {source}")]
    MachineDoc {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

impl From<Error> for crate::core::Error {
    fn from(err: Error) -> crate::core::Error {
        crate::core::Error::external(err)
    }
}
