//! Local and remote command execution.
//!
//! The only execution dimension the rest of the system cares about is
//! local versus remote: everything else reduces to "run this argv and
//! give me the output back, or tell me why you could not". The remote
//! runner wraps the local one, reaching the target machine over ssh with
//! the controller's system identity.

use std::io::Write;
use std::process::Command;

use super::errors::{Error, MachineResult};

/// The ssh key installed on every controller machine.
pub const SYSTEM_IDENTITY: &str = "/var/lib/juju/system-identity";

const SSH_USER: &str = "ubuntu";

/// Runs a command or a privileged script on some machine.
pub trait CommandRunner {
    /// Runs `argv[0]` with the remaining elements as literal arguments -
    /// no shell interpretation. Returns the combined stdout and stderr.
    /// On non-zero exit the error carries the captured stderr when there
    /// is any, otherwise the exit status.
    fn run(&self, argv: &[&str]) -> MachineResult<String>;

    /// Runs a shell script with elevated privileges, passing positional
    /// arguments through to it.
    fn run_script(&self, script: &str, args: &[&str]) -> MachineResult<String>;
}

/// Executes commands by spawning processes on this machine.
#[derive(Debug, Default, Clone)]
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> LocalRunner {
        LocalRunner
    }
}

impl CommandRunner for LocalRunner {
    fn run(&self, argv: &[&str]) -> MachineResult<String> {
        let (program, args) = argv.split_first().ok_or(Error::EmptyCommand)?;
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if !stderr.is_empty() {
                return Err(Error::CommandFailed(stderr));
            }
            return Err(Error::ExitStatus {
                program: program.to_string(),
                status: output.status.to_string(),
            });
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }

    fn run_script(&self, script: &str, args: &[&str]) -> MachineResult<String> {
        let mut argv = vec!["sudo", "bash", "-c", script, "local-script"];
        argv.extend_from_slice(args);
        self.run(&argv)
    }
}

/// Executes commands on another controller machine over ssh.
#[derive(Debug, Clone)]
pub struct RemoteRunner {
    local: LocalRunner,
    ip: String,
}

impl RemoteRunner {
    pub fn new(ip: impl Into<String>) -> RemoteRunner {
        RemoteRunner {
            local: LocalRunner::new(),
            ip: ip.into(),
        }
    }

    // Only root can read the system identity, hence sudo for ssh itself.
    // tty allocation is forced so remote sudo works without one locally.
    fn ssh_prefix(&self) -> Vec<String> {
        vec![
            "sudo".to_string(),
            "ssh".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking no".to_string(),
            "-t".to_string(),
            "-t".to_string(),
            "-i".to_string(),
            SYSTEM_IDENTITY.to_string(),
            format!("{}@{}", SSH_USER, self.ip),
        ]
    }

    fn run_remote(&self, argv: &[&str]) -> MachineResult<String> {
        if argv.is_empty() {
            return Err(Error::EmptyCommand);
        }
        let mut full = self.ssh_prefix();
        // The command is sent to the target as one string.
        full.push(argv.join(" "));
        let refs: Vec<&str> = full.iter().map(String::as_str).collect();
        self.local.run(&refs)
    }

    fn copy_to_target(&self, path: &str) -> MachineResult<()> {
        let argv = vec![
            "sudo".to_string(),
            "scp".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking no".to_string(),
            "-i".to_string(),
            SYSTEM_IDENTITY.to_string(),
            path.to_string(),
            format!("{}@{}:{}", SSH_USER, self.ip, path),
        ];
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        self.local.run(&refs).map_err(|source| Error::ScriptCopy {
            ip: self.ip.clone(),
            source: Box::new(source),
        })?;
        Ok(())
    }
}

impl CommandRunner for RemoteRunner {
    fn run(&self, argv: &[&str]) -> MachineResult<String> {
        self.run_remote(argv)
    }

    fn run_script(&self, script: &str, args: &[&str]) -> MachineResult<String> {
        // Stage the script under /tmp locally, copy it to the same path
        // on the target, run it there. The local file is removed when the
        // handle drops; the remote copy is removed below on every path.
        let mut file = tempfile::Builder::new()
            .prefix("juju-restore-script")
            .tempfile_in("/tmp")
            .map_err(Error::ScriptFile)?;
        file.write_all(script.as_bytes()).map_err(Error::ScriptFile)?;
        file.flush().map_err(Error::ScriptFile)?;

        let path = file.path().to_string_lossy().into_owned();
        self.copy_to_target(&path)?;

        let mut argv = vec!["sudo", "bash", path.as_str()];
        argv.extend_from_slice(args);
        let result = self.run_remote(&argv);

        if let Err(err) = self.run_remote(&["sudo", "rm", "-f", path.as_str()]) {
            tracing::warn!(ip = %self.ip, %err, "couldn't remove remote script copy");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_run_captures_stdout() {
        let runner = LocalRunner::new();
        let output = runner.run(&["echo", "hi:D"]).unwrap();
        assert_eq!(output, "hi:D\n");
    }

    #[test]
    fn test_local_run_combines_stderr() {
        let runner = LocalRunner::new();
        let output = runner
            .run(&["sh", "-c", "echo out; echo err >&2"])
            .unwrap();
        assert!(output.contains("out"));
        assert!(output.contains("err"));
    }

    #[test]
    fn test_local_run_empty_argv() {
        let runner = LocalRunner::new();
        let err = runner.run(&[]).unwrap_err();
        assert_eq!(err.to_string(), "no command given");
    }

    #[test]
    fn test_local_run_failure_uses_stderr() {
        let runner = LocalRunner::new();
        let err = runner
            .run(&["sh", "-c", "echo kaboom >&2; exit 3"])
            .unwrap_err();
        assert_eq!(err.to_string(), "kaboom");
    }

    #[test]
    fn test_local_run_failure_without_stderr_reports_status() {
        let runner = LocalRunner::new();
        let err = runner.run(&["sh", "-c", "exit 7"]).unwrap_err();
        assert!(err.to_string().contains("7"), "{}", err);
    }

    #[test]
    fn test_local_run_missing_program() {
        let runner = LocalRunner::new();
        let err = runner.run(&["definitely-not-a-real-program-ever"]).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn test_remote_prefix_shape() {
        let runner = RemoteRunner::new("10.5.7.23");
        let prefix = runner.ssh_prefix();
        assert_eq!(
            prefix,
            vec![
                "sudo",
                "ssh",
                "-o",
                "StrictHostKeyChecking no",
                "-t",
                "-t",
                "-i",
                "/var/lib/juju/system-identity",
                "ubuntu@10.5.7.23",
            ]
        );
    }
}
