//! PATH discovery for the database tooling.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::errors::{DbResult, Error};

/// Finds `snap` or, failing that, `plain` on the given PATH string.
/// Returns the binary name and whether the snap variant was chosen.
pub(crate) fn find_binary(
    path_var: &str,
    snap: &'static str,
    plain: &'static str,
) -> DbResult<(String, bool)> {
    if lookup_path(path_var, snap).is_some() {
        return Ok((snap.to_string(), true));
    }
    if lookup_path(path_var, plain).is_some() {
        return Ok((plain.to_string(), false));
    }
    Err(Error::BinaryNotFound { snap, plain })
}

pub(crate) fn lookup_path(path_var: &str, name: &str) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
