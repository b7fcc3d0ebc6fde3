//! Binary entry point for the structured dispatch daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match structuredd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr().lock(), "structuredd: {error}");
            ExitCode::FAILURE
        }
    }
}
