//! Operator prompts and progress messages.

use std::io::{BufRead, Write};

use super::errors::{CliResult, Error};

/// Communicates with the operator: posts progress messages and collects
/// confirmations. All operator-facing text flows through one writer so
/// it stays in order.
pub struct UserInteractions<'a> {
    input: &'a mut dyn BufRead,
    output: &'a mut dyn Write,
}

impl<'a> UserInteractions<'a> {
    pub fn new(input: &'a mut dyn BufRead, output: &'a mut dyn Write) -> UserInteractions<'a> {
        UserInteractions { input, output }
    }

    /// Posts a message for the operator. Failures to write progress
    /// output are not worth aborting a restore over.
    pub fn notify(&mut self, message: &str) {
        let _ = self.output.write_all(message.as_bytes());
        let _ = self.output.flush();
    }

    /// Reads an answer; `y` or `yes` in any case proceeds, anything else
    /// aborts.
    pub fn confirm_yes(&mut self) -> CliResult<()> {
        let mut line = String::new();
        self.input.read_line(&mut line).map_err(Error::Input)?;
        let answer = line.trim();
        if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
            return Ok(());
        }
        Err(Error::Aborted)
    }
}
