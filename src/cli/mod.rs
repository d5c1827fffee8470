//! Command line surface: arguments, the restore command driver,
//! operator interaction and credential discovery.

mod args;
mod command;
mod credentials;
mod errors;
mod interactions;
mod messages;

pub use args::RestoreArgs;
pub use command::{ConnectFn, LoadCredentialsFn, OpenBackupFn, RestoreCommand};
pub use credentials::read_credentials;
pub use errors::{CliResult, Error};
pub use interactions::UserInteractions;
