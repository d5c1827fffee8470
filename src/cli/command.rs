//! The restore command: wires the collaborators together and drives the
//! orchestrator phase by phase, talking to the operator in between.

use std::path::Path;

use tracing::warn;

use crate::core::{
    BackupFile, Database, NodeFactory, NodeResults, Restorer,
};
use crate::db::DialInfo;
use crate::{backup, db, machine};

use super::args::RestoreArgs;
use super::credentials;
use super::errors::{CliResult, Error};
use super::interactions::UserInteractions;
use super::messages;

/// Opens the database gateway.
pub type ConnectFn = Box<dyn Fn(DialInfo) -> crate::core::CoreResult<Box<dyn Database>>>;

/// Unpacks the backup archive: `(path, temp_root)`.
pub type OpenBackupFn =
    Box<dyn Fn(&Path, &Path) -> crate::core::CoreResult<Box<dyn BackupFile>>>;

/// Loads database credentials when none were given.
pub type LoadCredentialsFn = Box<dyn Fn() -> CliResult<(String, String)>>;

/// The `juju-restore` command. Collaborator constructors are injected so
/// tests can run the whole flow against fakes.
pub struct RestoreCommand {
    connect: ConnectFn,
    open_backup: OpenBackupFn,
    factory: NodeFactory,
    load_credentials: LoadCredentialsFn,
}

impl RestoreCommand {
    pub fn new(
        connect: ConnectFn,
        open_backup: OpenBackupFn,
        factory: NodeFactory,
        load_credentials: LoadCredentialsFn,
    ) -> RestoreCommand {
        RestoreCommand {
            connect,
            open_backup,
            factory,
            load_credentials,
        }
    }

    /// The command with its production collaborators.
    pub fn production() -> RestoreCommand {
        RestoreCommand::new(
            Box::new(|info| {
                let database = db::dial(info)?;
                Ok(Box::new(database) as Box<dyn Database>)
            }),
            Box::new(|path, temp_root| {
                let opened = backup::open(path, temp_root)?;
                Ok(Box::new(opened) as Box<dyn BackupFile>)
            }),
            Box::new(machine::node_for_member),
            Box::new(credentials::read_credentials),
        )
    }

    /// Runs the restore end to end.
    pub fn run(self, args: &RestoreArgs, ui: &mut UserInteractions<'_>) -> CliResult<()> {
        let (username, password) = if args.username.is_empty() {
            (self.load_credentials)()?
        } else {
            (args.username.clone(), args.password.clone())
        };

        ui.notify("Connecting to database...\n");
        let database = (self.connect)(DialInfo {
            hostname: args.hostname.clone(),
            port: args.port.clone(),
            username,
            password,
            ssl: args.ssl,
        })?;

        let opened = (self.open_backup)(&args.backup_file, &args.temp_root).map_err(|source| {
            Error::OpenBackup {
                path: args.backup_file.clone(),
                root: args.temp_root.clone(),
                source,
            }
        })?;

        let mut restorer = Restorer::new(database, opened, self.factory);
        let result = run_phases(&mut restorer, args, ui);
        if let Err(err) = restorer.close() {
            warn!(%err, "closing restore resources");
        }
        result
    }
}

fn run_phases(
    restorer: &mut Restorer,
    args: &RestoreArgs,
    ui: &mut UserInteractions<'_>,
) -> CliResult<()> {
    let mut manual = args.manual_agent_control;

    ui.notify("Checking database and replica set health...\n");
    restorer.check_database_state()?;
    ui.notify(messages::DB_HEALTH_COMPLETE);

    let precheck = restorer
        .check_restorable(args.allow_downgrade)
        .map_err(Error::Precheck)?;
    ui.notify(&messages::precheck_summary(&precheck));

    if restorer.is_ha() {
        if manual {
            ui.notify(messages::SECONDARY_AGENTS_MUST_STOP);
        } else {
            ui.notify(messages::RELEASE_AGENTS_CONTROL);
            match ui.confirm_yes() {
                Ok(()) => {}
                // Declining hands control of the secondaries back to the
                // operator rather than aborting the restore.
                Err(Error::Aborted) => manual = true,
                Err(err) => return Err(err),
            }
            if !manual {
                ui.notify("\nChecking connectivity to secondary controller machines...\n");
                let connections = restorer.check_secondary_controller_nodes()?;
                ui.notify(&messages::node_results(&connections));
                if connections.values().any(Option::is_some) {
                    return Err(Error::SecondariesUnreachable);
                }
            }
        }
    }

    ui.notify(messages::PRECHECKS_COMPLETED);
    ui.confirm_yes()?;

    // Past this point the restore runs to completion or fails with a
    // diagnostic; there is no clean abort.
    ui.notify("\nStopping Juju agents...\n");
    check_node_results(ui, restorer.stop_agents(!manual)?)?;

    ui.notify("\nRunning restore...\n");
    ui.notify(&format!(
        "Detailed mongorestore output in {}.\n",
        args.restore_log.display()
    ));
    restorer.restore_database(&args.restore_log, args.include_status_history)?;
    ui.notify("\nDatabase restore complete.\n");

    if restorer.needs_agent_version_update()? {
        ui.notify("\nRewriting agent versions to match the backup...\n");
        restorer.update_agent_versions()?;
    }

    ui.notify("\nWaiting for the replica set to stabilise...\n");
    restorer.wait_for_stabilisation();

    ui.notify("\nStarting Juju agents...\n");
    check_node_results(ui, restorer.start_agents(!manual)?)?;

    restorer.reconnect_database()?;
    if restorer.is_ha() {
        ui.notify("Primary node may have shifted.\n");
    }
    ui.notify("\nRestore complete.\n");
    Ok(())
}

// Reports per-node results; even one failure means the cluster cannot be
// driven as a whole, so the restore stops.
fn check_node_results(ui: &mut UserInteractions<'_>, results: NodeResults) -> CliResult<()> {
    ui.notify(&messages::node_results(&results));
    if results.values().any(Option::is_some) {
        return Err(Error::AgentsNotManaged);
    }
    Ok(())
}
