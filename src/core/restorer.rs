//! The restore orchestrator.
//!
//! `Restorer` drives the whole restore sequence: replica set health
//! checks, backup/controller compatibility prechecks, stopping and
//! starting agents across the cluster, the dump replay, agent version
//! rewrites and the post-replay stabilisation wait.
//!
//! Ordering rules for cluster-wide operations:
//! - agents are stopped primary-last, so a re-election is not triggered
//!   mid-shutdown;
//! - agents are started primary-first, so the primary identity is
//!   preserved where possible.

use std::collections::HashMap;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::errors::{CoreResult, Error};
use super::model::{
    BackupMetadata, ControllerInfo, MemberState, PrecheckResult, ReplicaSet, ReplicaSetMember,
    Service,
};
use super::{BackupFile, ControllerNode, Database};

/// Maps a replica set member to a concrete controller node. The
/// production factory dispatches the self member to a local command
/// runner and all others to remote runners.
pub type NodeFactory = Box<dyn Fn(&ReplicaSetMember) -> Box<dyn ControllerNode>>;

/// Bounded exponential schedule for the post-replay stabilisation wait.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    pub initial: Duration,
    pub factor: f64,
    pub max_attempts: u32,
}

impl Default for RetrySchedule {
    fn default() -> RetrySchedule {
        RetrySchedule {
            initial: Duration::from_secs(5),
            factor: 1.6,
            max_attempts: 20,
        }
    }
}

/// Per-node results of a cluster-wide operation, keyed by node IP.
/// `None` marks success.
pub type NodeResults = HashMap<String, Option<Error>>;

/// Checks the database and backup state and restores the backup into the
/// database.
pub struct Restorer {
    db: Box<dyn Database>,
    backup: Box<dyn BackupFile>,
    factory: NodeFactory,

    // Replica set snapshot, taken on first use and refreshed only by a
    // successful stabilisation wait.
    replica_set: Option<ReplicaSet>,
    primary: Option<Box<dyn ControllerNode>>,
    secondaries: Vec<Box<dyn ControllerNode>>,

    backup_metadata: Option<BackupMetadata>,
    controller_info: Option<ControllerInfo>,

    stabilisation: RetrySchedule,
}

impl Restorer {
    pub fn new(db: Box<dyn Database>, backup: Box<dyn BackupFile>, factory: NodeFactory) -> Restorer {
        Restorer {
            db,
            backup,
            factory,
            replica_set: None,
            primary: None,
            secondaries: Vec::new(),
            backup_metadata: None,
            controller_info: None,
            stabilisation: RetrySchedule::default(),
        }
    }

    /// Overrides the stabilisation wait schedule.
    pub fn with_stabilisation_schedule(mut self, schedule: RetrySchedule) -> Restorer {
        self.stabilisation = schedule;
        self
    }

    /// Determines whether this database is appropriate for restoring
    /// into: every member healthy and in PRIMARY/SECONDARY state with a
    /// machine tag, exactly one primary, and that primary is the node we
    /// are running on.
    pub fn check_database_state(&mut self) -> CoreResult<()> {
        self.load_replica_set()?;
        let replica_set = self.replica_set.as_ref().expect("replica set loaded");
        debug!(name = %replica_set.name, members = replica_set.members.len(), "replica set");

        let primary = check_health(replica_set)?;
        if !primary.self_node {
            return Err(Error::NotPrimary(primary.clone()));
        }
        self.build_nodes()?;
        Ok(())
    }

    /// Whether the controller has more than one node.
    pub fn is_ha(&self) -> bool {
        self.replica_set
            .as_ref()
            .map(|rs| rs.members.len() > 1)
            .unwrap_or(false)
    }

    /// Compares the backup metadata against the live controller.
    /// All version comparisons ignore the build component.
    pub fn check_restorable(&mut self, allow_downgrade: bool) -> CoreResult<PrecheckResult> {
        let metadata = self.backup.metadata()?;
        let controller = self.db.controller_info()?;

        if metadata.controller_model_uuid != controller.controller_model_uuid {
            return Err(Error::ModelUuidMismatch {
                backup: metadata.controller_model_uuid,
                controller: controller.controller_model_uuid,
            });
        }
        if metadata.ha_nodes != controller.ha_nodes {
            return Err(Error::HaNodesMismatch {
                backup: metadata.ha_nodes,
                controller: controller.ha_nodes,
            });
        }
        if metadata.series != controller.series {
            return Err(Error::SeriesMismatch {
                backup: metadata.series,
                controller: controller.series,
            });
        }

        let backup_version = metadata.juju_version.without_build();
        let controller_version = controller.juju_version.without_build();
        if allow_downgrade {
            if backup_version > controller_version {
                return Err(Error::VersionTooNew {
                    backup: metadata.juju_version,
                    controller: controller.juju_version,
                });
            }
        } else if backup_version < controller_version {
            return Err(Error::VersionOlder {
                backup: metadata.juju_version,
                controller: controller.juju_version,
            });
        } else if backup_version != controller_version {
            return Err(Error::VersionMismatch {
                backup: metadata.juju_version,
                controller: controller.juju_version,
            });
        }

        let result = PrecheckResult {
            backup_date: metadata.backup_created,
            controller_model_uuid: controller.controller_model_uuid.clone(),
            backup_juju_version: metadata.juju_version.clone(),
            controller_juju_version: controller.juju_version.clone(),
            model_count: metadata.model_count,
        };
        self.backup_metadata = Some(metadata);
        self.controller_info = Some(controller);
        Ok(result)
    }

    /// Pings every secondary controller node, returning per-node results.
    pub fn check_secondary_controller_nodes(&mut self) -> CoreResult<NodeResults> {
        self.ensure_nodes()?;
        let mut results = NodeResults::new();
        for node in &self.secondaries {
            results.insert(node.ip().to_string(), node.ping().err());
        }
        Ok(results)
    }

    /// Stops the machine agents, secondaries first and the primary last.
    /// With `all` false only the primary agent is touched.
    pub fn stop_agents(&self, all: bool) -> CoreResult<NodeResults> {
        let primary = self.primary.as_ref().ok_or(Error::PrechecksNotRun)?;
        let mut results = NodeResults::new();
        if all {
            for node in &self.secondaries {
                results.insert(
                    node.ip().to_string(),
                    node.stop_service(Service::MachineAgent).err(),
                );
            }
        }
        results.insert(
            primary.ip().to_string(),
            primary.stop_service(Service::MachineAgent).err(),
        );
        Ok(results)
    }

    /// Starts the machine agents, primary first.
    pub fn start_agents(&self, all: bool) -> CoreResult<NodeResults> {
        let primary = self.primary.as_ref().ok_or(Error::PrechecksNotRun)?;
        let mut results = NodeResults::new();
        results.insert(
            primary.ip().to_string(),
            primary.start_service(Service::MachineAgent).err(),
        );
        if all {
            for node in &self.secondaries {
                results.insert(
                    node.ip().to_string(),
                    node.start_service(Service::MachineAgent).err(),
                );
            }
        }
        Ok(results)
    }

    /// Replays the backup's database dump into the live database.
    pub fn restore_database(
        &self,
        log_file: &Path,
        include_status_history: bool,
    ) -> CoreResult<()> {
        self.db
            .restore_from_dump(self.backup.dump_directory(), log_file, include_status_history)
    }

    /// Whether the backup carries a different agent version than the
    /// controller currently runs (builds ignored).
    pub fn needs_agent_version_update(&self) -> CoreResult<bool> {
        let metadata = self.backup_metadata.as_ref().ok_or(Error::PrechecksNotRun)?;
        let controller = self.controller_info.as_ref().ok_or(Error::PrechecksNotRun)?;
        Ok(metadata.juju_version.without_build() != controller.juju_version.without_build())
    }

    /// Rewrites the agent version on every node, primary first, to match
    /// the backup. Failures are aggregated into one deterministic error.
    pub fn update_agent_versions(&self) -> CoreResult<()> {
        let metadata = self.backup_metadata.as_ref().ok_or(Error::PrechecksNotRun)?;
        let primary = self.primary.as_ref().ok_or(Error::PrechecksNotRun)?;
        let target = &metadata.juju_version;

        let mut failures = Vec::new();
        for node in std::iter::once(primary).chain(self.secondaries.iter()) {
            if let Err(err) = node.update_agent_version(target) {
                failures.push(format!("on {}: {}", node.ip(), err));
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        failures.sort();
        Err(Error::AgentUpgradeFailed(failures))
    }

    /// Waits for the replica set to settle after the agents were
    /// manipulated. Service restarts cause transient membership flaps, so
    /// the health check is retried on a bounded exponential schedule. On
    /// success the cached replica set snapshot is refreshed; on
    /// exhaustion the pre-wait snapshot is kept and the restore carries
    /// on - an unstable set at this point is not fatal.
    pub fn wait_for_stabilisation(&mut self) {
        let schedule = self.stabilisation.clone();
        let mut delay = schedule.initial;
        for attempt in 1..=schedule.max_attempts {
            if attempt > 1 {
                thread::sleep(delay);
                delay = delay.mul_f64(schedule.factor);
            }
            match self.db.replica_set() {
                Ok(replica_set) => match check_health(&replica_set) {
                    Ok(_) => {
                        debug!(attempt, "replica set stabilised");
                        self.replica_set = Some(replica_set);
                        return;
                    }
                    Err(err) => debug!(attempt, %err, "replica set not settled yet"),
                },
                Err(err) => debug!(attempt, %err, "querying replica set"),
            }
        }
        warn!(
            attempts = schedule.max_attempts,
            "replica set did not stabilise, continuing with the last known state"
        );
    }

    pub fn reconnect_database(&mut self) -> CoreResult<()> {
        self.db.reconnect()
    }

    /// Releases the database session and the unpacked backup. Both are
    /// attempted even if the first fails.
    pub fn close(&mut self) -> CoreResult<()> {
        let db_result = self.db.close();
        let backup_result = self.backup.close();
        db_result.and(backup_result)
    }

    fn load_replica_set(&mut self) -> CoreResult<()> {
        if self.replica_set.is_none() {
            self.replica_set = Some(self.db.replica_set()?);
        }
        Ok(())
    }

    fn ensure_nodes(&mut self) -> CoreResult<()> {
        if self.primary.is_some() {
            return Ok(());
        }
        self.load_replica_set()?;
        self.build_nodes()
    }

    fn build_nodes(&mut self) -> CoreResult<()> {
        let replica_set = self.replica_set.as_ref().expect("replica set loaded");
        let primary_member = replica_set
            .members
            .iter()
            .find(|m| m.state == MemberState::Primary)
            .ok_or(Error::NoPrimary)?;
        self.primary = Some((self.factory)(primary_member));
        self.secondaries = replica_set
            .members
            .iter()
            .filter(|m| m.id != primary_member.id)
            .map(|m| (self.factory)(m))
            .collect();
        Ok(())
    }
}

/// Validates replica set health, returning the primary member.
///
/// Per-member violations take precedence over a missing primary so the
/// operator sees the unhealthy members first.
fn check_health(replica_set: &ReplicaSet) -> CoreResult<&ReplicaSetMember> {
    let mut primary = None;
    let mut unhealthy = Vec::new();
    for member in &replica_set.members {
        if member.state == MemberState::Primary {
            primary = Some(member);
        }
        let valid_state =
            member.state == MemberState::Primary || member.state == MemberState::Secondary;
        if !member.healthy || !valid_state || member.juju_machine_id.is_empty() {
            unhealthy.push(member.clone());
        }
    }
    if !unhealthy.is_empty() {
        return Err(Error::UnhealthyMembers(unhealthy));
    }
    primary.ok_or(Error::NoPrimary)
}
