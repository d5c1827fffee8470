//! Core restore error types.

use thiserror::Error;

use super::model::ReplicaSetMember;
use super::version::Version;

/// Result type for core restore operations.
pub type CoreResult<T> = Result<T, Error>;

/// Errors raised while checking and restoring a controller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unhealthy replica set members: {}", member_list(.0))]
    UnhealthyMembers(Vec<ReplicaSetMember>),

    #[error("no primary found in replica set")]
    NoPrimary,

    #[error("not running on primary replica set member, primary is {0}")]
    NotPrimary(ReplicaSetMember),

    #[error("controller model UUIDs don't match - backup: {backup}, controller: {controller}")]
    ModelUuidMismatch { backup: String, controller: String },

    #[error("controller HA node counts don't match - backup: {backup}, controller: {controller}")]
    HaNodesMismatch { backup: usize, controller: usize },

    #[error("controller series don't match - backup: {backup}, controller: {controller}")]
    SeriesMismatch { backup: String, controller: String },

    #[error("backup juju version {backup} is greater than controller version {controller}")]
    VersionTooNew { backup: Version, controller: Version },

    #[error(
        "juju versions don't match - backup: {backup}, controller: {controller} \
         (pass --allow-downgrade to restore an older backup)"
    )]
    VersionOlder { backup: Version, controller: Version },

    #[error("juju versions don't match - backup: {backup}, controller: {controller}")]
    VersionMismatch { backup: Version, controller: Version },

    #[error("updating agent versions:\n{}", .0.join("\n"))]
    AgentUpgradeFailed(Vec<String>),

    #[error("invalid version {0:?}")]
    InvalidVersion(String),

    #[error("restore prechecks have not been run")]
    PrechecksNotRun,

    #[error("snapshots have already been created")]
    AlreadySnapshotted,

    #[error("not all machines have snapshots so only discarding is allowed")]
    MissingSnapshots,

    #[error("errors discarding snapshots: {0}")]
    DiscardFailed(usize),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// An error from one of the concrete collaborators (database gateway,
    /// backup reader, controller node), surfaced verbatim.
    #[error(transparent)]
    External(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    pub fn external(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::External(Box::new(err))
    }

    /// Wraps the error with a short description of the failed operation.
    pub fn context(self, context: impl Into<String>) -> Error {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn is_unhealthy_members(&self) -> bool {
        matches!(self, Error::UnhealthyMembers(_))
    }
}

/// Adds operation context to core errors carried in a `Result`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> CoreResult<T>;
}

impl<T> ResultExt<T> for CoreResult<T> {
    fn context(self, context: impl Into<String>) -> CoreResult<T> {
        self.map_err(|e| e.context(context))
    }
}

fn member_list(members: &[ReplicaSetMember]) -> String {
    members
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
