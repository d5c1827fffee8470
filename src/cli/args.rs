//! Command line argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

const LONG_ABOUT: &str = "\
juju-restore must be executed on the database primary host of a Juju
controller.

The command checks the state of the target database and the details of
the backup file provided, then restores the contents of the backup into
the controller database.";

/// Restore a Juju backup file into a controller database.
#[derive(Debug, Parser)]
#[command(name = "juju-restore", long_about = LONG_ABOUT)]
pub struct RestoreArgs {
    /// Backup archive to restore (tar.gz).
    pub backup_file: PathBuf,

    /// Hostname of the Juju database server.
    #[arg(long, default_value = "localhost")]
    pub hostname: String,

    /// Port of the Juju database server.
    #[arg(long, default_value = "37017")]
    pub port: String,

    /// Use TLS to connect to the database.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub ssl: bool,

    /// User for connecting to the database (omit to read credentials
    /// from agent.conf).
    #[arg(long, default_value = "")]
    pub username: String,

    /// Password for connecting to the database.
    #[arg(long, default_value = "")]
    pub password: String,

    /// More output from the restore (debug logging).
    #[arg(long, conflicts_with = "logging_config")]
    pub verbose: bool,

    /// Logging filter directives, e.g. "juju_restore=debug".
    #[arg(long)]
    pub logging_config: Option<String>,

    /// The operator stops and starts the Juju and database agents on
    /// secondary controller machines; juju-restore leaves them alone.
    #[arg(long)]
    pub manual_agent_control: bool,

    /// Location to unpack the backup file.
    #[arg(long, default_value = "/tmp")]
    pub temp_root: PathBuf,

    /// Location to write the dump tool's output.
    #[arg(long, default_value = "restore.log")]
    pub restore_log: PathBuf,

    /// Restore status history for machines and units (can be large).
    #[arg(long)]
    pub include_status_history: bool,

    /// Allow restoring a backup taken with an older Juju version.
    #[arg(long)]
    pub allow_downgrade: bool,
}

const DEFAULT_LOG_FILTER: &str = "info";
const VERBOSE_LOG_FILTER: &str = "debug";

impl RestoreArgs {
    /// The logging filter selected by the flags.
    pub fn log_filter(&self) -> &str {
        if self.verbose {
            return VERBOSE_LOG_FILTER;
        }
        self.logging_config.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
