//! Agentpod CLI - build, start and verify a containerized agent workload

use std::collections::HashMap;

use agentpod::cli::{dispatch, Args, Settings};
use agentpod::error::PodError;
use agentpod::logging::Logger;
use agentpod::sequencer::CancelToken;
use clap::Parser;

fn main() {
    let args = Args::parse();

    let settings = match Settings::from_args(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let logger = Logger::new(settings.log.clone());

    // Installed before any workload exists so an early ctrl-C still unwinds through cleanup
    let cancel = CancelToken::new();
    if let Err(e) = cancel.install_signal_handler() {
        logger.warn("signal_handler", e.to_string());
    }

    let process_env: HashMap<String, String> = std::env::vars().collect();

    let code = match dispatch(&args.command, &settings, &logger, &cancel, &process_env) {
        Ok(code) => code,
        Err(e @ PodError::Cancelled(_)) => {
            logger.warn("command", e.to_string());
            e.exit_code()
        }
        Err(e) => {
            logger.fatal("command", e.to_string());
            e.exit_code()
        }
    };

    logger.shutdown();
    std::process::exit(code);
}
