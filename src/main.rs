use std::process::ExitCode;

use clap::Parser;
use locsync::Cli;
use locsync::error::SyncError;

fn main() -> ExitCode {
    let cli = Cli::parse();
    locsync::init_tracing(cli.verbose);

    match locsync::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(SyncError::Cancelled) = err.downcast_ref::<SyncError>() {
                eprintln!("Cancelled");
            } else {
                eprintln!("Error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
