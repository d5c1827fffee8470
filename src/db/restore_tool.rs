//! Invoking the external dump-restore tool.
//!
//! The snap-confined `juju-db.mongorestore` is preferred over a bare
//! `mongorestore`. The snap build can only read certain directories, so
//! a dump unpacked under /tmp is moved below `$HOME/snap/juju-db/common`
//! before the run and the copy removed afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use super::errors::{DbResult, Error};
use super::lookup::find_binary;
use super::DialInfo;

const RESTORE_BINARY: &str = "mongorestore";
const SNAP_RESTORE_BINARY: &str = "juju-db.mongorestore";

// Relative to $HOME.
const HOME_SNAP_DIR: &str = "snap/juju-db/common";

/// Replays the dump with the discovered restore binary, writing the
/// tool's combined output to `log_file` whether or not it succeeds.
pub(crate) fn run_restore(
    info: &DialInfo,
    dump_dir: &Path,
    log_file: &Path,
    include_status_history: bool,
) -> DbResult<()> {
    let path_var = std::env::var("PATH").unwrap_or_default();
    let (binary, is_snap) = find_binary(&path_var, SNAP_RESTORE_BINARY, RESTORE_BINARY)?;

    let mut dump_dir = dump_dir.to_path_buf();
    let mut moved: Option<PathBuf> = None;
    if is_snap {
        if let Some(snap_dump) = move_to_home_snap(&dump_dir)? {
            dump_dir = snap_dump.clone();
            moved = Some(snap_dump);
        }
    }

    let result = invoke(&binary, info, &dump_dir, log_file, include_status_history);

    if let Some(dir) = moved {
        if let Err(err) = fs::remove_dir_all(&dir) {
            warn!(dir = %dir.display(), %err, "error removing snap dump dir");
        }
    }
    result
}

fn invoke(
    binary: &str,
    info: &DialInfo,
    dump_dir: &Path,
    log_file: &Path,
    include_status_history: bool,
) -> DbResult<()> {
    let args = build_restore_args(info, dump_dir, include_status_history);
    debug!(%binary, "running restore command");

    let output = Command::new(binary)
        .args(&args)
        .output()
        .map_err(|source| Error::SpawnTool {
            tool: binary.to_string(),
            source,
        })?;

    let mut combined = output.stdout.clone();
    combined.extend_from_slice(&output.stderr);
    if let Err(source) = fs::write(log_file, &combined) {
        if output.status.success() {
            return Err(Error::WriteLog {
                path: log_file.to_path_buf(),
                source,
            });
        }
        warn!(path = %log_file.display(), %source, "couldn't write restore log");
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        };
        return Err(Error::RestoreFailed {
            tool: binary.to_string(),
            message,
        });
    }
    Ok(())
}

pub(crate) fn build_restore_args(
    info: &DialInfo,
    dump_dir: &Path,
    include_status_history: bool,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-vvvvv",
        "--drop",
        "--writeConcern=majority",
        "--host",
        info.hostname.as_str(),
        "--port",
        info.port.as_str(),
        "--authenticationDatabase=admin",
        "--username",
        info.username.as_str(),
        "--password",
        info.password.as_str(),
        "--stopOnError",
        "--maintainInsertionOrder",
        "--nsExclude=logs.*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if info.ssl {
        args.push("--ssl".to_string());
        args.push("--sslAllowInvalidCertificates".to_string());
    }
    if !include_status_history {
        args.push("--nsExclude=juju.statuseshistory".to_string());
    }
    args.push(dump_dir.to_string_lossy().into_owned());
    args
}

// Moves the dump below the snap's writable area if it is not already
// there. Returns the new location, or None when no move was needed.
fn move_to_home_snap(dump_dir: &Path) -> DbResult<Option<PathBuf>> {
    let home = std::env::var_os("HOME").ok_or(Error::NoHome)?;
    let snap_root = PathBuf::from(home).join(HOME_SNAP_DIR);
    if dump_dir.starts_with(&snap_root) {
        return Ok(None);
    }

    let relative = dump_dir.strip_prefix("/").unwrap_or(dump_dir);
    let target = snap_root.join(relative);
    if let Some(parent) = target.parent() {
        debug!(parent = %parent.display(), "creating snap dump parent");
        fs::create_dir_all(parent).map_err(Error::SnapDumpParent)?;
    }
    debug!(from = %dump_dir.display(), to = %target.display(), "moving dump to snap dump dir");
    fs::rename(dump_dir, &target).map_err(Error::MoveDump)?;
    Ok(Some(target))
}
