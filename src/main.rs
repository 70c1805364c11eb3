//! Rollout Timeline - dependency-aware rollout planning

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = rollout_timeline::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
