//! Database credential discovery.
//!
//! When no username is given on the command line, the credentials come
//! from the machine agent's configuration on this controller machine:
//! the `tag` and `statepassword` fields of the first
//! `/var/lib/juju/agents/machine-*/agent.conf` found.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::errors::{CliResult, Error};

const AGENTS_DIR: &str = "/var/lib/juju/agents";
const AGENT_CONF: &str = "agent.conf";

/// Loads the database username and password from the standard agent
/// configuration location.
pub fn read_credentials() -> CliResult<(String, String)> {
    read_credentials_from(Path::new(AGENTS_DIR))
}

pub(crate) fn read_credentials_from(agents_dir: &Path) -> CliResult<(String, String)> {
    let mut machine_dirs: Vec<_> = match fs::read_dir(agents_dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_dir()
                    && path
                        .file_name()
                        .map(|name| name.to_string_lossy().starts_with("machine-"))
                        .unwrap_or(false)
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    machine_dirs.sort();

    let conf_path = machine_dirs
        .first()
        .map(|dir| dir.join(AGENT_CONF))
        .filter(|path| path.is_file())
        .ok_or_else(|| {
            Error::Credentials(
                "couldn't find an agent.conf - please specify username and password".to_string(),
            )
        })?;

    #[derive(Deserialize)]
    struct AgentConf {
        #[serde(default)]
        tag: String,
        #[serde(default)]
        statepassword: String,
    }

    let contents = fs::read_to_string(&conf_path)
        .map_err(|e| Error::Credentials(format!("reading {:?}: {}", conf_path, e)))?;
    let conf: AgentConf = serde_yaml::from_str(&contents)
        .map_err(|e| Error::Credentials(format!("reading {:?}: {}", conf_path, e)))?;

    if conf.tag.is_empty() {
        return Err(Error::Credentials(format!(
            "no username found in {:?} - tag field is missing or blank",
            conf_path
        )));
    }
    if conf.statepassword.is_empty() {
        return Err(Error::Credentials(format!(
            "no password found in {:?} - statepassword field is missing or blank",
            conf_path
        )));
    }
    Ok((conf.tag, conf.statepassword))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write_agent_conf(dir: &Path, machine: &str, contents: &str) {
        let machine_dir = dir.join(machine);
        fs::create_dir_all(&machine_dir).unwrap();
        fs::write(machine_dir.join("agent.conf"), contents).unwrap();
    }

    #[test]
    fn test_reads_tag_and_statepassword() {
        let dir = TempDir::new().unwrap();
        write_agent_conf(
            dir.path(),
            "machine-0",
            "tag: machine-0\nstatepassword: sekrit\nupgradedToVersion: 2.8.1\n",
        );
        let (username, password) = read_credentials_from(dir.path()).unwrap();
        assert_eq!(username, "machine-0");
        assert_eq!(password, "sekrit");
    }

    #[test]
    fn test_picks_first_machine_dir() {
        let dir = TempDir::new().unwrap();
        write_agent_conf(dir.path(), "machine-11", "tag: machine-11\nstatepassword: b\n");
        write_agent_conf(dir.path(), "machine-0", "tag: machine-0\nstatepassword: a\n");
        let (username, _) = read_credentials_from(dir.path()).unwrap();
        assert_eq!(username, "machine-0");
    }

    #[test]
    fn test_missing_agent_conf() {
        let dir = TempDir::new().unwrap();
        let err = read_credentials_from(dir.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "loading credentials: couldn't find an agent.conf - please specify username and password"
        );
    }

    #[test]
    fn test_blank_tag_rejected() {
        let dir = TempDir::new().unwrap();
        write_agent_conf(dir.path(), "machine-0", "statepassword: sekrit\n");
        let err = read_credentials_from(dir.path()).unwrap_err();
        assert!(err.to_string().contains("tag field is missing or blank"));
    }

    #[test]
    fn test_blank_password_rejected() {
        let dir = TempDir::new().unwrap();
        write_agent_conf(dir.path(), "machine-0", "tag: machine-0\n");
        let err = read_credentials_from(dir.path()).unwrap_err();
        assert!(err
            .to_string()
            .contains("statepassword field is missing or blank"));
    }
}
