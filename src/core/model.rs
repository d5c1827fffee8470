//! Value types shared across the restore pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::version::Version;

/// Replica set member states as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberState {
    Primary,
    Secondary,
    /// Any other state (RECOVERING, ARBITER, DOWN, ...) disqualifies the
    /// member from a restore.
    Other(String),
}

impl MemberState {
    pub fn as_str(&self) -> &str {
        match self {
            MemberState::Primary => "PRIMARY",
            MemberState::Secondary => "SECONDARY",
            MemberState::Other(s) => s,
        }
    }
}

impl From<&str> for MemberState {
    fn from(s: &str) -> MemberState {
        match s {
            "PRIMARY" => MemberState::Primary,
            "SECONDARY" => MemberState::Secondary,
            other => MemberState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status information about one replica set member.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaSetMember {
    pub id: i32,
    /// The reachable address of the node, `host:port`.
    pub name: String,
    /// Whether this member is the node we are connected to.
    pub self_node: bool,
    pub healthy: bool,
    pub state: MemberState,
    /// Short token naming the node's services and on-disk directories.
    pub juju_machine_id: String,
}

impl ReplicaSetMember {
    /// The host portion of the member name.
    pub fn ip(&self) -> &str {
        match self.name.split_once(':') {
            Some((host, _)) => host,
            None => &self.name,
        }
    }
}

impl fmt::Display for ReplicaSetMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} (juju machine {})",
            self.id, self.name, self.juju_machine_id
        )
    }
}

/// A replica set and its members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicaSet {
    pub name: String,
    pub members: Vec<ReplicaSetMember>,
}

/// Information about the live controller, read from its database.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerInfo {
    pub controller_model_uuid: String,
    pub juju_version: Version,
    /// OS distribution codename of the controller machines.
    pub series: String,
    pub ha_nodes: usize,
}

/// Information collected from a backup archive.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupMetadata {
    pub format_version: i64,
    pub controller_model_uuid: String,
    pub juju_version: Version,
    pub series: String,
    pub backup_created: DateTime<Utc>,
    pub hostname: String,
    pub contains_logs: bool,
    pub model_count: usize,
    pub ha_nodes: usize,
}

/// The outcome of a successful compatibility precheck, displayed to the
/// operator before the restore proceeds.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecheckResult {
    pub backup_date: DateTime<Utc>,
    pub controller_model_uuid: String,
    pub backup_juju_version: Version,
    pub controller_juju_version: Version,
    pub model_count: usize,
}

/// A point-in-time report of one controller node's state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeStatus {
    /// Free bytes on the volume holding the database directory.
    #[serde(rename = "free-space")]
    pub free_space: u64,
    /// Size in bytes of the database directory.
    #[serde(rename = "database-size")]
    pub database_size: u64,
    #[serde(rename = "machine-agent-running")]
    pub machine_agent_running: bool,
    #[serde(rename = "database-running")]
    pub database_running: bool,
}

/// The per-node services the restore manipulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// `jujud-machine-<id>`
    MachineAgent,
    /// `juju-db`
    Database,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_display() {
        let member = ReplicaSetMember {
            id: 2,
            name: "djula".to_string(),
            self_node: true,
            healthy: true,
            state: MemberState::Primary,
            juju_machine_id: "2".to_string(),
        };
        assert_eq!(member.to_string(), r#"2 "djula" (juju machine 2)"#);
    }

    #[test]
    fn test_member_ip_strips_port() {
        let member = ReplicaSetMember {
            id: 1,
            name: "10.5.7.23:37017".to_string(),
            self_node: false,
            healthy: true,
            state: MemberState::Secondary,
            juju_machine_id: "0".to_string(),
        };
        assert_eq!(member.ip(), "10.5.7.23");
    }

    #[test]
    fn test_member_state_round_trip() {
        assert_eq!(MemberState::from("PRIMARY"), MemberState::Primary);
        assert_eq!(MemberState::from("SECONDARY"), MemberState::Secondary);
        assert_eq!(
            MemberState::from("OUCHY"),
            MemberState::Other("OUCHY".to_string())
        );
        assert_eq!(MemberState::from("OUCHY").to_string(), "OUCHY");
    }

    #[test]
    fn test_node_status_from_yaml() {
        let status: NodeStatus = serde_yaml::from_str(
            "free-space: 16884899840\ndatabase-size: 12345\nmachine-agent-running: true\ndatabase-running: false\n",
        )
        .unwrap();
        assert_eq!(
            status,
            NodeStatus {
                free_space: 16884899840,
                database_size: 12345,
                machine_agent_running: true,
                database_running: false,
            }
        );
    }
}
