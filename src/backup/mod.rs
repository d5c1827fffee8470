//! Reading backup archives.
//!
//! A backup is a gzipped tar holding a single top-level directory with
//! `metadata.json`, the database dump under `dump/`, and a nested
//! `root.tar` carrying the controller's configuration tree. Opening a
//! backup unpacks the whole lot into a private temp directory; closing
//! the reader (or failing to open it) removes every trace.

mod bson;
mod errors;
mod metadata;

pub use errors::{BackupResult, Error};

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::TempDir;
use tracing::debug;

use crate::core::{BackupFile, BackupMetadata, CoreResult};

const ROOT_TAR: &str = "root.tar";
const DUMP_DIR: &str = "dump";
const LOGS_DIR: &str = "dump/logs";
const MODELS_FILE: &str = "dump/juju/models.bson";

/// A backup archive unpacked into a temp directory.
#[derive(Debug)]
pub struct ExpandedBackup {
    temp: Option<TempDir>,
    top: PathBuf,
    dump: PathBuf,
}

/// Unpacks the backup at `path` into a fresh temp directory under
/// `temp_root` and returns a reader over the contents. The temp
/// directory is removed again if any part of the unpacking fails.
pub fn open(path: &Path, temp_root: &Path) -> BackupResult<ExpandedBackup> {
    let temp = tempfile::Builder::new()
        .prefix("juju-restore-")
        .tempdir_in(temp_root)
        .map_err(|source| Error::CreateTempDir {
            dir: temp_root.to_path_buf(),
            source,
        })?;

    // Dropping `temp` on the error paths below removes the directory.
    extract_archive(path, temp.path()).map_err(|e| Error::Extract {
        dir: temp.path().to_path_buf(),
        source: Box::new(e),
    })?;

    let top = find_top_dir(temp.path())?;

    // Inside the extracted archive is another root.tar that holds the
    // agent configuration tree; expand it in place.
    extract_archive(&top.join(ROOT_TAR), &top).map_err(|e| Error::ExtractRoot {
        dir: temp.path().to_path_buf(),
        source: Box::new(e),
    })?;

    let dump = top.join(DUMP_DIR);
    Ok(ExpandedBackup {
        temp: Some(temp),
        top,
        dump,
    })
}

impl ExpandedBackup {
    fn contains_logs(&self) -> BackupResult<bool> {
        let logs = self.top.join(LOGS_DIR);
        match fs::read_dir(&logs) {
            Ok(mut entries) => Ok(entries.next().is_some()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(Error::ReadFile { path: logs, source }),
        }
    }

    fn model_count(&self) -> BackupResult<usize> {
        let path = self.top.join(MODELS_FILE);
        let file = File::open(&path).map_err(|source| Error::ReadFile {
            path: path.clone(),
            source,
        })?;
        bson::count_documents(file)
    }
}

impl BackupFile for ExpandedBackup {
    fn metadata(&self) -> CoreResult<BackupMetadata> {
        let mut metadata = metadata::read_metadata_json(&self.top)?;
        metadata.contains_logs = self.contains_logs()?;
        metadata.model_count = self.model_count()?;
        Ok(metadata)
    }

    fn dump_directory(&self) -> &Path {
        &self.dump
    }

    fn close(&mut self) -> CoreResult<()> {
        if let Some(temp) = self.temp.take() {
            temp.close().map_err(Error::RemoveTempDir)?;
        }
        Ok(())
    }
}

fn extract_archive(path: &Path, dest: &Path) -> BackupResult<()> {
    debug!(path = %path.display(), dest = %dest.display(), "extracting");
    let file = File::open(path).map_err(|source| Error::OpenArchive {
        path: path.to_path_buf(),
        source,
    })?;

    let unpack_err = |source: std::io::Error| Error::Unpack {
        path: path.to_path_buf(),
        source,
    };
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Archive::new(GzDecoder::new(file))
            .unpack(dest)
            .map_err(unpack_err)?;
    } else {
        Archive::new(file).unpack(dest).map_err(unpack_err)?;
    }
    Ok(())
}

// The archive is expected to contain exactly one top-level directory.
fn find_top_dir(dir: &Path) -> BackupResult<PathBuf> {
    let mut dirs = Vec::new();
    let entries = fs::read_dir(dir).map_err(|source| Error::ReadFile {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| Error::ReadFile {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    match dirs.as_slice() {
        [single] => Ok(single.clone()),
        _ => Err(Error::MissingTopDir),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::Builder;
    use tempfile::TempDir;

    use super::bson::testing::DocBuilder;
    use super::*;

    const MODEL_UUID: &str = "e2a6a1e5-abea-4393-8593-5a45ae53ab97";

    struct Fixture {
        // Holds the archive and the unpack root.
        _dir: TempDir,
        archive: std::path::PathBuf,
        temp_root: std::path::PathBuf,
    }

    fn build_archive(with_root_tar: bool, with_logs: bool) -> Fixture {
        let dir = TempDir::new().unwrap();

        // Lay out the juju-backup directory.
        let backup_dir = dir.path().join("juju-backup");
        fs::create_dir_all(backup_dir.join("dump/juju")).unwrap();
        fs::write(
            backup_dir.join("metadata.json"),
            format!(
                r#"{{"ID":"x","FormatVersion":1,"Started":"2020-02-25T04:12:41.038760008Z",
                    "ModelUUID":"{}","Hostname":"juju-53ab97-0","Version":"2.9.12",
                    "Series":"focal","HANodes":1}}"#,
                MODEL_UUID
            ),
        )
        .unwrap();

        let mut models = Vec::new();
        models.extend(DocBuilder::new().string("name", "controller").build());
        models.extend(DocBuilder::new().string("name", "default").build());
        fs::write(backup_dir.join("dump/juju/models.bson"), models).unwrap();

        if with_logs {
            fs::create_dir_all(backup_dir.join("dump/logs")).unwrap();
            fs::write(backup_dir.join("dump/logs/logs.bson"), b"x").unwrap();
        }

        if with_root_tar {
            // The nested tar holds the controller's home tree.
            let home_dir = dir.path().join("home-tree");
            fs::create_dir_all(home_dir.join("home/ubuntu")).unwrap();
            fs::write(home_dir.join("home/ubuntu/agent.conf"), "tag: machine-0\n").unwrap();
            let root_tar = fs::File::create(backup_dir.join("root.tar")).unwrap();
            let mut builder = Builder::new(root_tar);
            builder.append_dir_all("home", home_dir.join("home")).unwrap();
            builder.finish().unwrap();
        }

        // Pack juju-backup into the outer tar.gz.
        let archive = dir.path().join("backup.tar.gz");
        let file = fs::File::create(&archive).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);
        builder.append_dir_all("juju-backup", &backup_dir).unwrap();
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();

        let temp_root = dir.path().join("unpack");
        fs::create_dir_all(&temp_root).unwrap();
        Fixture {
            _dir: dir,
            archive,
            temp_root,
        }
    }

    fn leftovers(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_open_unpacks_expected_layout() {
        let fixture = build_archive(true, false);
        let mut backup = open(&fixture.archive, &fixture.temp_root).unwrap();

        let top = backup.top.clone();
        assert!(top.ends_with("juju-backup"));
        assert!(top.join("metadata.json").is_file());
        assert!(top.join("dump/juju/models.bson").is_file());
        // root.tar was expanded in place.
        assert!(top.join("home/ubuntu/agent.conf").is_file());
        assert_eq!(backup.dump_directory(), top.join("dump"));

        backup.close().unwrap();
        assert_eq!(leftovers(&fixture.temp_root), 0);
    }

    #[test]
    fn test_open_missing_root_tar() {
        let fixture = build_archive(false, false);
        let err = open(&fixture.archive, &fixture.temp_root).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("extracting root.tar in"), "{}", message);
        assert!(message.contains("root.tar"), "{}", message);
        // Nothing is left behind under the temp root.
        assert_eq!(leftovers(&fixture.temp_root), 0);
    }

    #[test]
    fn test_open_missing_archive() {
        let fixture = build_archive(true, false);
        let err = open(Path::new("/nonexistent/backup.tar.gz"), &fixture.temp_root).unwrap_err();
        assert!(err.to_string().starts_with("extracting backup to"));
        assert_eq!(leftovers(&fixture.temp_root), 0);
    }

    #[test]
    fn test_metadata_includes_derived_fields() {
        let fixture = build_archive(true, true);
        let mut backup = open(&fixture.archive, &fixture.temp_root).unwrap();

        let metadata = backup.metadata().unwrap();
        assert_eq!(metadata.controller_model_uuid, MODEL_UUID);
        assert_eq!(metadata.model_count, 2);
        assert!(metadata.contains_logs);
        assert_eq!(metadata.ha_nodes, 1);

        backup.close().unwrap();
    }

    #[test]
    fn test_metadata_no_logs() {
        let fixture = build_archive(true, false);
        let mut backup = open(&fixture.archive, &fixture.temp_root).unwrap();
        let metadata = backup.metadata().unwrap();
        assert!(!metadata.contains_logs);
        backup.close().unwrap();
    }

    #[test]
    fn test_close_twice_is_quiet() {
        let fixture = build_archive(true, false);
        let mut backup = open(&fixture.archive, &fixture.temp_root).unwrap();
        backup.close().unwrap();
        backup.close().unwrap();
    }

    #[test]
    fn test_drop_removes_unpacked_files() {
        let fixture = build_archive(true, false);
        {
            let _backup = open(&fixture.archive, &fixture.temp_root).unwrap();
            assert_eq!(leftovers(&fixture.temp_root), 1);
        }
        assert_eq!(leftovers(&fixture.temp_root), 0);
    }
}
