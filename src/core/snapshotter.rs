//! Cluster-wide filesystem snapshots of the database directory.
//!
//! Taking or restoring a snapshot requires the database service to be
//! stopped everywhere, so both flows bracket the per-node copy with a
//! cluster-wide stop (primary last) and start (primary first). If a flow
//! fails part-way the database services are restarted on a best-effort
//! basis so the cluster is not left down.

use std::collections::HashMap;

use tracing::error;

use super::errors::{CoreResult, Error, ResultExt};
use super::model::Service;
use super::{ControllerNode, Database};

/// Manages database snapshots across all controller nodes.
pub struct Snapshotter {
    db: Box<dyn Database>,
    primary: Box<dyn ControllerNode>,
    others: Vec<Box<dyn ControllerNode>>,

    /// Maps each node's IP to the name of its snapshot.
    snapshots: HashMap<String, String>,
}

impl Snapshotter {
    pub fn new(
        db: Box<dyn Database>,
        primary: Box<dyn ControllerNode>,
        others: Vec<Box<dyn ControllerNode>>,
    ) -> Snapshotter {
        Snapshotter {
            db,
            primary,
            others,
            snapshots: HashMap::new(),
        }
    }

    fn node_count(&self) -> usize {
        self.others.len() + 1
    }

    fn primary_first(&self) -> Vec<&dyn ControllerNode> {
        let mut nodes: Vec<&dyn ControllerNode> = vec![self.primary.as_ref()];
        nodes.extend(self.others.iter().map(|n| n.as_ref()));
        nodes
    }

    fn primary_last(&self) -> Vec<&dyn ControllerNode> {
        let mut nodes: Vec<&dyn ControllerNode> =
            self.others.iter().map(|n| n.as_ref()).collect();
        nodes.push(self.primary.as_ref());
        nodes
    }

    fn stop_all(&self) -> CoreResult<()> {
        for node in self.primary_last() {
            node.stop_service(Service::Database)
                .context(format!("on {}", node.ip()))?;
        }
        Ok(())
    }

    fn start_all(&self) -> CoreResult<()> {
        for node in self.primary_first() {
            node.start_service(Service::Database)
                .context(format!("on {}", node.ip()))?;
        }
        Ok(())
    }

    // Best-effort restart of any database service found stopped.
    fn try_restart_all(&self) {
        for node in self.primary_first() {
            let status = match node.status() {
                Ok(status) => status,
                Err(err) => {
                    error!(ip = node.ip(), %err, "couldn't get status");
                    continue;
                }
            };
            if status.database_running {
                continue;
            }
            if let Err(err) = node.start_service(Service::Database) {
                error!(ip = node.ip(), %err, "couldn't restart database");
            }
        }
    }

    /// Takes a snapshot on every node, stopping and restarting the
    /// database around the copies.
    pub fn snapshot(&mut self) -> CoreResult<()> {
        if !self.snapshots.is_empty() {
            return Err(Error::AlreadySnapshotted);
        }
        let result = self.snapshot_inner();
        if result.is_err() {
            self.try_restart_all();
        }
        result
    }

    fn snapshot_inner(&mut self) -> CoreResult<()> {
        self.stop_all().context("stopping databases")?;

        for index in 0..self.node_count() {
            let (ip, name) = {
                let node = self.node(index);
                let name = node
                    .snapshot_database()
                    .context("snapshotting databases")?;
                (node.ip().to_string(), name)
            };
            self.snapshots.insert(ip, name);
        }

        self.start_all().context("starting databases")?;
        self.db.reconnect().context("reconnecting to db")
    }

    /// Restores the snapshot on every node. Refused unless every node has
    /// a recorded snapshot.
    pub fn restore(&mut self) -> CoreResult<()> {
        if self.snapshots.len() != self.node_count() {
            return Err(Error::MissingSnapshots);
        }
        for node in self.primary_first() {
            if !self.snapshots.contains_key(node.ip()) {
                return Err(Error::MissingSnapshots);
            }
        }

        if let Err(err) = self.stop_all() {
            // Don't leave the databases stopped if we only managed to
            // stop some of them.
            self.try_restart_all();
            return Err(err.context("stopping databases"));
        }

        for index in 0..self.node_count() {
            let result = {
                let node = self.node(index);
                let name = self.snapshots[node.ip()].clone();
                node.restore_snapshot(&name)
                    .context(format!("restoring snapshot {:?}", name))
                    .map(|()| node.ip().to_string())
            };
            match result {
                Ok(ip) => {
                    // A restored snapshot has been consumed - it must not
                    // be discarded later.
                    self.snapshots.remove(&ip);
                }
                Err(err) => {
                    // Nothing restored yet means the databases can come
                    // back up with their old contents. A partial restore
                    // is surfaced as-is: there is no safe rollback.
                    if self.snapshots.len() == self.node_count() {
                        self.try_restart_all();
                    }
                    return Err(err);
                }
            }
        }

        self.start_all().context("starting databases")?;
        self.db.reconnect().context("reconnecting to db")
    }

    /// Removes all recorded snapshots. Failures are counted rather than
    /// aborting, so one broken node doesn't strand the others' snapshots.
    pub fn discard(&mut self) -> CoreResult<()> {
        let mut failures = 0;
        for index in 0..self.node_count() {
            let discarded = {
                let node = self.node(index);
                match self.snapshots.get(node.ip()) {
                    None => continue,
                    Some(name) => match node.discard_snapshot(name) {
                        Ok(()) => Some(node.ip().to_string()),
                        Err(err) => {
                            error!(ip = node.ip(), name = %name, %err, "error discarding snapshot");
                            failures += 1;
                            None
                        }
                    },
                }
            };
            if let Some(ip) = discarded {
                self.snapshots.remove(&ip);
            }
        }
        if failures > 0 {
            return Err(Error::DiscardFailed(failures));
        }
        Ok(())
    }

    fn node(&self, index: usize) -> &dyn ControllerNode {
        if index == 0 {
            self.primary.as_ref()
        } else {
            self.others[index - 1].as_ref()
        }
    }
}
