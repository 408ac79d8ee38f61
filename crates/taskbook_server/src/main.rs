//! Server entry point.
//!
//! # Responsibility
//! - Parse configuration, start logging, then hand over to `serve`.

use clap::Parser;
use std::process::ExitCode;
use taskbook_server::{serve, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("taskbook_server: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = taskbook_core::init_logging(&config.logging) {
        eprintln!("taskbook_server: logging init failed: {err}");
        return ExitCode::FAILURE;
    }

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=server_exit module=server status=error error={err}");
            eprintln!("taskbook_server: {err}");
            ExitCode::FAILURE
        }
    }
}
