//! Backup metadata parsing.
//!
//! Two metadata schemas exist in the wild. Format 1 carries the HA node
//! count directly; format 0 predates it (and stores the controller model
//! UUID under `Environment`), so the node count is recovered from the
//! database dump: the `controllerNodes` collection when it was dumped,
//! otherwise the machines of the controller model that hold the
//! manage-model job.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::{BackupMetadata, Version};

use super::bson;
use super::errors::{BackupResult, Error};

const METADATA_FILE: &str = "metadata.json";
const CONTROLLER_NODES_FILE: &str = "dump/juju/controllerNodes.bson";
const MACHINES_FILE: &str = "dump/juju/machines.bson";

// Machines with this job run the controller.
const JOB_MANAGE_MODEL: i64 = 2;

/// Parses `metadata.json` inside the unpacked backup directory.
///
/// `contains_logs` and `model_count` are derived from the dump rather
/// than the metadata document; the caller fills them in.
pub(crate) fn read_metadata_json(dir: &Path) -> BackupResult<BackupMetadata> {
    let path = dir.join(METADATA_FILE);
    let data = fs::read_to_string(&path).map_err(|source| Error::ReadFile {
        path: path.clone(),
        source,
    })?;

    // Try the current schema and check the format version first.
    let flat: FlatMetadata = serde_json::from_str(&data).map_err(Error::MetadataParse)?;
    match flat.format_version {
        Some(version) if version > 1 => Err(Error::UnsupportedFormat(version)),
        Some(1) => Ok(BackupMetadata {
            format_version: 1,
            controller_model_uuid: flat.model_uuid,
            juju_version: flat.version,
            series: flat.series,
            backup_created: flat.started,
            hostname: flat.hostname,
            contains_logs: false,
            model_count: 0,
            ha_nodes: flat.ha_nodes as usize,
        }),
        _ => {
            // No format version set - this is a version 0 structure.
            let flat: FlatMetadataV0 =
                serde_json::from_str(&data).map_err(Error::MetadataParse)?;
            let ha_nodes = count_ha_nodes(dir, &flat.environment)
                .map_err(|e| Error::CountingHaNodes(Box::new(e)))?;
            Ok(BackupMetadata {
                format_version: 0,
                controller_model_uuid: flat.environment,
                juju_version: flat.version,
                series: flat.series,
                backup_created: flat.started,
                hostname: flat.hostname,
                contains_logs: false,
                model_count: 0,
                ha_nodes,
            })
        }
    }
}

// Version 0 metadata has no HA node count; recover it from the dump.
fn count_ha_nodes(dir: &Path, model_uuid: &str) -> BackupResult<usize> {
    let nodes_path = dir.join(CONTROLLER_NODES_FILE);
    match File::open(&nodes_path) {
        Ok(file) => return bson::count_documents(file),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(Error::ReadFile {
                path: nodes_path,
                source,
            })
        }
    }

    // Fall back to counting machines in the right model with the right
    // job.
    let machines_path = dir.join(MACHINES_FILE);
    let file = File::open(&machines_path).map_err(|source| Error::ReadFile {
        path: machines_path,
        source,
    })?;

    let mut ha_nodes = 0;
    let mut doc_count = 0;
    bson::each_document(file, |doc| {
        doc_count += 1;
        let wrap = |e: Error| Error::MachineDoc {
            index: doc_count,
            source: Box::new(e),
        };
        if bson::string_field(doc, "model-uuid").map_err(wrap)?.as_deref() != Some(model_uuid) {
            return Ok(());
        }
        let jobs = bson::int_array_field(doc, "jobs").map_err(wrap)?;
        if jobs.unwrap_or_default().contains(&JOB_MANAGE_MODEL) {
            ha_nodes += 1;
        }
        Ok(())
    })?;
    Ok(ha_nodes)
}

// The flat metadata layout written by the backup creator. Only the
// fields the restore needs are declared.
#[derive(Debug, Deserialize)]
struct FlatMetadata {
    #[serde(rename = "FormatVersion")]
    format_version: Option<i64>,
    #[serde(rename = "ModelUUID", default)]
    model_uuid: String,
    #[serde(rename = "Started")]
    started: DateTime<Utc>,
    #[serde(rename = "Hostname", default)]
    hostname: String,
    #[serde(rename = "Version", default)]
    version: Version,
    #[serde(rename = "Series", default)]
    series: String,
    #[serde(rename = "HANodes", default)]
    ha_nodes: i64,
}

#[derive(Debug, Deserialize)]
struct FlatMetadataV0 {
    #[serde(rename = "Environment", default)]
    environment: String,
    #[serde(rename = "Started")]
    started: DateTime<Utc>,
    #[serde(rename = "Hostname", default)]
    hostname: String,
    #[serde(rename = "Version", default)]
    version: Version,
    #[serde(rename = "Series", default)]
    series: String,
}
