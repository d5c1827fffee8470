//! The database gateway.
//!
//! `MongoDatabase` satisfies `core::Database` on top of a narrow
//! `Session` seam: the session evaluates javascript against the server
//! and returns whatever the client printed. The gateway owns the
//! interesting logic - joining replica set status with the configured
//! members, deriving the controller's identity and HA shape, and driving
//! the external dump-restore tool.

mod errors;
mod lookup;
mod restore_tool;
mod shell;

pub use errors::{DbResult, Error};
pub use shell::{MongoShellSession, Session};

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::{
    ControllerInfo, CoreResult, Database, MemberState, ReplicaSet, ReplicaSetMember, Version,
};

// Machines with this job run the controller; life 0 is "alive".
const JOB_MANAGE_MODEL: i64 = 2;
const LIFE_ALIVE: i64 = 0;

const MACHINE_ID_TAG: &str = "juju-machine-id";

/// Connection details for the controller database.
#[derive(Debug, Clone)]
pub struct DialInfo {
    pub hostname: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub ssl: bool,
}

/// Opens a gateway to the database, verifying connectivity with a ping.
pub fn dial(info: DialInfo) -> DbResult<MongoDatabase> {
    let session = MongoShellSession::discover(info.clone())?;
    let db = MongoDatabase {
        info,
        session: Box::new(session),
    };
    db.ping()?;
    Ok(db)
}

/// A connection to the controller database.
pub struct MongoDatabase {
    info: DialInfo,
    session: Box<dyn Session>,
}

impl MongoDatabase {
    /// Builds a gateway over an existing session. The production path is
    /// `dial`; this is the seam for tests.
    pub fn with_session(info: DialInfo, session: Box<dyn Session>) -> MongoDatabase {
        MongoDatabase { info, session }
    }

    fn ping(&self) -> DbResult<()> {
        let reply: Value = self.eval_json("admin", "db.runCommand({ping: 1})")?;
        match reply.get("ok").and_then(Value::as_f64) {
            Some(ok) if ok == 1.0 => Ok(()),
            _ => Err(Error::BadReply(reply.to_string())),
        }
    }

    fn eval_json<T: serde::de::DeserializeOwned>(
        &self,
        database: &str,
        expression: &str,
    ) -> DbResult<T> {
        let script = format!("print(JSON.stringify({}))", expression);
        let output = self.session.eval(database, &script)?;
        let trimmed = output.trim();
        serde_json::from_str(trimmed).map_err(|_| Error::BadReply(trimmed.to_string()))
    }

    fn replica_set_inner(&self) -> DbResult<ReplicaSet> {
        let status: StatusReply = self
            .eval_json("admin", "rs.status()")
            .map_err(Error::query("replica set status"))?;
        // The configured members carry extra node information, including
        // the machine id tags.
        let config: ConfigReply = self
            .eval_json("admin", "rs.conf()")
            .map_err(Error::query("replica set config"))?;

        let tags: HashMap<i32, HashMap<String, String>> = config
            .members
            .into_iter()
            .map(|member| (member.id, member.tags))
            .collect();

        Ok(ReplicaSet {
            name: status.set,
            members: status
                .members
                .into_iter()
                .map(|member| {
                    let machine_id = tags
                        .get(&member.id)
                        .and_then(|t| t.get(MACHINE_ID_TAG))
                        .cloned()
                        .unwrap_or_default();
                    ReplicaSetMember {
                        id: member.id,
                        name: member.name,
                        self_node: member.self_node,
                        healthy: member.health > 0.0,
                        state: MemberState::from(member.state.as_str()),
                        juju_machine_id: machine_id,
                    }
                })
                .collect(),
        })
    }

    fn controller_info_inner(&self) -> DbResult<ControllerInfo> {
        let controller: Option<ModelDoc> = self
            .eval_json(
                "admin",
                r#"db.getSiblingDB("juju").models.findOne({name: "controller"})"#,
            )
            .map_err(Error::query("controller model"))?;
        let controller = controller.ok_or(Error::NoControllerModel)?;

        let settings: Option<SettingsDoc> = self
            .eval_json(
                "admin",
                &format!(
                    r#"db.getSiblingDB("juju").settings.findOne({{_id: "{}:e"}})"#,
                    controller.id
                ),
            )
            .map_err(Error::query("controller settings"))?;
        let settings = settings.ok_or(Error::NoControllerSettings)?;
        let version_value = settings
            .settings
            .get("agent-version")
            .ok_or(Error::NoAgentVersion)?;
        let version_text = version_value
            .as_str()
            .ok_or_else(|| Error::AgentVersion(version_value.to_string()))?;
        let juju_version: Version = version_text
            .parse()
            .map_err(|_| Error::AgentVersion(version_text.to_string()))?;

        let machines: Vec<MachineDoc> = self
            .eval_json(
                "admin",
                &format!(
                    r#"db.getSiblingDB("juju").machines.find({{"model-uuid": "{}", "jobs": {{"$in": [{}]}}, "life": {}}}, {{"series": 1}}).toArray()"#,
                    controller.id, JOB_MANAGE_MODEL, LIFE_ALIVE
                ),
            )
            .map_err(Error::query("controller machines"))?;

        let ha_nodes = machines.len();
        let mut all_series: Vec<String> = machines.into_iter().map(|m| m.series).collect();
        all_series.sort();
        all_series.dedup();
        if all_series.len() != 1 {
            return Err(Error::MultipleSeries(all_series));
        }
        let series = all_series.remove(0);

        Ok(ControllerInfo {
            controller_model_uuid: controller.id,
            juju_version,
            series,
            ha_nodes,
        })
    }
}

impl Database for MongoDatabase {
    fn replica_set(&self) -> CoreResult<ReplicaSet> {
        let replica_set = self.replica_set_inner()?;
        debug!(name = %replica_set.name, "fetched replica set status");
        Ok(replica_set)
    }

    fn controller_info(&self) -> CoreResult<ControllerInfo> {
        Ok(self.controller_info_inner()?)
    }

    fn restore_from_dump(
        &self,
        dump_dir: &Path,
        log_file: &Path,
        include_status_history: bool,
    ) -> CoreResult<()> {
        restore_tool::run_restore(&self.info, dump_dir, log_file, include_status_history)?;
        Ok(())
    }

    fn reconnect(&mut self) -> CoreResult<()> {
        self.ping()?;
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        self.session.close()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    #[serde(default)]
    set: String,
    #[serde(default)]
    members: Vec<StatusMember>,
}

#[derive(Debug, Deserialize)]
struct StatusMember {
    #[serde(rename = "_id")]
    id: i32,
    name: String,
    #[serde(default)]
    health: f64,
    #[serde(rename = "stateStr", default)]
    state: String,
    // Only present on the member the client is connected to.
    #[serde(rename = "self", default)]
    self_node: bool,
}

#[derive(Debug, Deserialize)]
struct ConfigReply {
    #[serde(default)]
    members: Vec<ConfigMember>,
}

#[derive(Debug, Deserialize)]
struct ConfigMember {
    #[serde(rename = "_id")]
    id: i32,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ModelDoc {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct SettingsDoc {
    #[serde(default)]
    settings: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct MachineDoc {
    #[serde(default)]
    series: String,
}
