//! Machine operation error types.

use std::io;

use thiserror::Error;

/// Result type for machine operations.
pub type MachineResult<T> = Result<T, Error>;

/// Errors from running commands on controller machines.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no command given")]
    EmptyCommand,

    #[error("running {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The command exited non-zero and wrote to stderr; the stderr
    /// contents are the diagnostic.
    #[error("{0}")]
    CommandFailed(String),

    #[error("{program} exited with {status}")]
    ExitStatus { program: String, status: String },

    #[error("creating script file: {0}")]
    ScriptFile(#[source] io::Error),

    #[error("copying script to {ip}: {source}")]
    ScriptCopy {
        ip: String,
        #[source]
        source: Box<Error>,
    },

    #[error("ping controller machine {ip} failed: expected {expected:?}, got {got:?}")]
    PingFailed {
        ip: String,
        expected: String,
        got: String,
    },

    #[error("{operation} should not have produced output, got {output:?}")]
    UnexpectedOutput { operation: String, output: String },

    #[error("parsing status output: {0}")]
    StatusParse(#[from] serde_yaml::Error),
}

impl From<Error> for crate::core::Error {
    fn from(err: Error) -> crate::core::Error {
        crate::core::Error::external(err)
    }
}
