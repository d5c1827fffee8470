//! The raw database session, driven through the database's own shell
//! client.
//!
//! The restore runs on a controller machine, where the database snap
//! ships its client alongside the server. Every query the gateway needs
//! is a one-shot `--eval` invocation returning JSON, which keeps the
//! whole tool on the same footing as the rest of its work: running
//! programs and reading what they print.

use crate::machine::{CommandRunner, LocalRunner};

use super::errors::{DbResult, Error};
use super::lookup::find_binary;
use super::DialInfo;

const CLIENT_BINARY: &str = "mongo";
const SNAP_CLIENT_BINARY: &str = "juju-db.mongo";

/// A session against the database server: evaluate javascript, get the
/// client's output back.
pub trait Session {
    fn eval(&self, database: &str, javascript: &str) -> DbResult<String>;

    fn close(&mut self) -> DbResult<()>;
}

/// A `Session` backed by the `mongo` shell client, preferring the
/// snap-confined variant when it is on PATH.
pub struct MongoShellSession {
    binary: String,
    info: DialInfo,
    runner: LocalRunner,
}

impl MongoShellSession {
    pub fn discover(info: DialInfo) -> DbResult<MongoShellSession> {
        let path_var = std::env::var("PATH").unwrap_or_default();
        let (binary, _) = find_binary(&path_var, SNAP_CLIENT_BINARY, CLIENT_BINARY)?;
        Ok(MongoShellSession {
            binary,
            info,
            runner: LocalRunner::new(),
        })
    }
}

impl Session for MongoShellSession {
    fn eval(&self, database: &str, javascript: &str) -> DbResult<String> {
        let mut argv = vec![
            self.binary.as_str(),
            "--host",
            self.info.hostname.as_str(),
            "--port",
            self.info.port.as_str(),
            "--quiet",
        ];
        if !self.info.username.is_empty() {
            argv.extend([
                "--username",
                self.info.username.as_str(),
                "--password",
                self.info.password.as_str(),
                "--authenticationDatabase",
                "admin",
            ]);
        }
        if self.info.ssl {
            argv.extend(["--ssl", "--sslAllowInvalidCertificates"]);
        }
        argv.extend([database, "--eval", javascript]);
        self.runner.run(&argv).map_err(Error::Eval)
    }

    fn close(&mut self) -> DbResult<()> {
        // Every eval is its own client process; there is nothing held
        // open to tear down.
        Ok(())
    }
}
