//! Restore core: the value model, the orchestrator and the contracts it
//! drives.
//!
//! The core never talks to a database, a process or the filesystem
//! directly; it composes the `Database`, `BackupFile` and `ControllerNode`
//! contracts, which the `db`, `backup` and `machine` modules implement.

mod errors;
mod model;
mod restorer;
mod snapshotter;
mod version;

pub use errors::{CoreResult, Error, ResultExt};
pub use model::{
    BackupMetadata, ControllerInfo, MemberState, NodeStatus, PrecheckResult, ReplicaSet,
    ReplicaSetMember, Service,
};
pub use restorer::{NodeFactory, NodeResults, Restorer, RetrySchedule};
pub use snapshotter::Snapshotter;
pub use version::Version;

use std::path::Path;

/// A connection to the controller database, abstracting the operations
/// the restore applies.
pub trait Database {
    /// Current replica set status, including per-member machine tags.
    fn replica_set(&self) -> CoreResult<ReplicaSet>;

    /// Identity and version details of the live controller.
    fn controller_info(&self) -> CoreResult<ControllerInfo>;

    /// Replays a database dump into the live database, dropping existing
    /// collections. Tool output is written to `log_file` whether or not
    /// the replay succeeds.
    fn restore_from_dump(
        &self,
        dump_dir: &Path,
        log_file: &Path,
        include_status_history: bool,
    ) -> CoreResult<()>;

    /// Re-establishes the session after the controller agents have been
    /// restarted.
    fn reconnect(&mut self) -> CoreResult<()>;

    fn close(&mut self) -> CoreResult<()>;
}

/// An unpacked backup archive.
pub trait BackupFile {
    fn metadata(&self) -> CoreResult<BackupMetadata>;

    /// The directory holding the database dump.
    fn dump_directory(&self) -> &Path;

    /// Removes the unpacked files.
    fn close(&mut self) -> CoreResult<()>;
}

/// One machine in the controller cluster.
///
/// Every operation maps to exactly one local or remote command; errors
/// surface verbatim and nothing is retried at this level.
pub trait ControllerNode {
    fn ip(&self) -> &str;

    /// Verifies the node is reachable.
    fn ping(&self) -> CoreResult<()>;

    fn status(&self) -> CoreResult<NodeStatus>;

    fn stop_service(&self, service: Service) -> CoreResult<()>;

    fn start_service(&self, service: Service) -> CoreResult<()>;

    /// Copies the database directory aside, returning the snapshot name.
    fn snapshot_database(&self) -> CoreResult<String>;

    /// Replaces the database directory with the named snapshot. The
    /// snapshot is consumed by a successful restore.
    fn restore_snapshot(&self, name: &str) -> CoreResult<()>;

    fn discard_snapshot(&self, name: &str) -> CoreResult<()>;

    /// Points the machine agent at the tools for `version` and rewrites
    /// the agent configuration to match.
    fn update_agent_version(&self, version: &Version) -> CoreResult<()>;
}
