//! Process entry point.
//!
//! Exit codes: 0 on success, 1 on an operational failure with a
//! diagnostic, 2 when the environment can't even be set up.

use std::io::{self, IsTerminal};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use juju_restore::cli::{RestoreArgs, RestoreCommand, UserInteractions};

fn main() {
    process::exit(run());
}

fn run() -> i32 {
    let args = RestoreArgs::parse();

    if let Err(err) = init_logging(&args) {
        eprintln!("invalid logging config: {}", err);
        return 2;
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();
    let mut ui = UserInteractions::new(&mut input, &mut output);

    match RestoreCommand::production().run(&args, &mut ui) {
        Ok(()) => 0,
        Err(err) if err.is_user_abort() => {
            eprintln!("{}", err);
            1
        }
        Err(err) => {
            eprintln!("ERROR: {}", err);
            1
        }
    }
}

fn init_logging(args: &RestoreArgs) -> Result<(), tracing_subscriber::filter::ParseError> {
    let filter = EnvFilter::try_new(args.log_filter())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
    Ok(())
}
