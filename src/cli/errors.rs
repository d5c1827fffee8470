//! CLI error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, Error>;

/// Errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum Error {
    /// The operator answered a prompt with anything but yes.
    #[error("restore aborted")]
    Aborted,

    #[error("reading input: {0}")]
    Input(#[source] io::Error),

    #[error("loading credentials: {0}")]
    Credentials(String),

    #[error("unpacking backup file {path:?} under {root:?}: {source}")]
    OpenBackup {
        path: PathBuf,
        root: PathBuf,
        #[source]
        source: core::Error,
    },

    #[error("precheck: {0}")]
    Precheck(#[source] core::Error),

    #[error(
        "'juju-restore' could not connect to all controller machines: \
         controllers' agents cannot be managed"
    )]
    SecondariesUnreachable,

    #[error(
        "'juju-restore' could not manipulate all necessary agents: \
         controllers' agents cannot be managed"
    )]
    AgentsNotManaged,

    #[error(transparent)]
    Core(#[from] core::Error),
}

impl Error {
    /// True when the operator chose to stop - the CLI exits without the
    /// ERROR banner for these.
    pub fn is_user_abort(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}
