//! swarmrunner - long-poll command coordinator and agent.

use clap::Parser;
use std::process::ExitCode;

use swarmrunner::{logging, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let invocation = match Commands::parse().resolve() {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Held until exit so buffered log lines are flushed.
    let _guard = match logging::init(invocation.log_dir(), invocation.log_stem()) {
        Ok((guard, _)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match invocation.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
