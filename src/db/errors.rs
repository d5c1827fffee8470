//! Database gateway error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for database gateway operations.
pub type DbResult<T> = Result<T, Error>;

/// Errors from talking to the controller database and the dump tooling.
#[derive(Debug, Error)]
pub enum Error {
    #[error("couldn't find {snap} or {plain} in PATH")]
    BinaryNotFound {
        snap: &'static str,
        plain: &'static str,
    },

    #[error("evaluating against the database: {0}")]
    Eval(#[source] crate::machine::Error),

    #[error("unexpected reply from the database client: {0}")]
    BadReply(String),

    #[error("getting {what}: {source}")]
    Query {
        what: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("no controller model found")]
    NoControllerModel,

    #[error("no settings found for the controller model")]
    NoControllerSettings,

    #[error("no agent-version in controller settings")]
    NoAgentVersion,

    #[error("invalid agent version {0:?}")]
    AgentVersion(String),

    #[error("expected one series, got {0:?}")]
    MultipleSeries(Vec<String>),

    #[error("couldn't determine home directory")]
    NoHome,

    #[error("creating snap dump parent: {0}")]
    SnapDumpParent(#[source] io::Error),

    #[error("moving dump to snap dump dir: {0}")]
    MoveDump(#[source] io::Error),

    #[error("running {tool}: {source}")]
    SpawnTool {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("running {tool}: {message}")]
    RestoreFailed { tool: String, message: String },

    #[error("writing restore log to {path:?}: {source}")]
    WriteLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn query(what: &'static str) -> impl FnOnce(Error) -> Error {
        move |source| Error::Query {
            what,
            source: Box::new(source),
        }
    }
}

impl From<Error> for crate::core::Error {
    fn from(err: Error) -> crate::core::Error {
        crate::core::Error::external(err)
    }
}
