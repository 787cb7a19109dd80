//! CLI entry point and dispatch logic
//!
//! `run()` parses the arguments, discovers the configuration, dispatches to
//! the command handlers and prints every error itself.

use clap::Parser;
use tracing::debug;

use super::args::{Cli, Commands};
use super::commands;

use crate::{Config, ConfigError, ExitCode, ShepherdError};

/// Main CLI execution function.
///
/// Prints all output including errors and returns the exit code to use on
/// failure. main.rs only calls `std::process::exit(code.as_i32())`.
pub fn run() -> Result<(), ExitCode> {
    run_with(Cli::parse())
}

/// Execute already parsed arguments.
pub fn run_with(cli: Cli) -> Result<(), ExitCode> {
    if let Err(e) = shepherd_utils::logging::init_tracing(cli.verbose) {
        eprintln!("Warning: Failed to initialize logging: {e}");
    }

    let config = match Config::discover(&cli.cli_args()) {
        Ok(config) => config,
        Err(err) => {
            match err.downcast::<ConfigError>() {
                Ok(config_err) => eprint!("{}", ShepherdError::from(config_err).display_for_user()),
                Err(other) => eprintln!("Error: {other:#}"),
            }
            return Err(ExitCode::CLI_ARGS);
        }
    };
    debug!(config_path = ?config.config_path, "Configuration loaded");

    let result = match cli.command {
        Commands::Run {
            exec,
            redirects,
            command,
        } => {
            commands::cleanup_stale_files(&config);
            commands::execute_run(&config, &exec, &redirects, &command)
        }
        Commands::Script { exec, file } => {
            commands::cleanup_stale_files(&config);
            commands::execute_script(&config, &exec, &file)
        }
        Commands::Render {
            multiline,
            cwd,
            redirects,
            command,
        } => {
            commands::execute_render(multiline, cwd.as_deref(), &redirects, &command);
            Ok(())
        }
        Commands::Config => {
            commands::execute_config(&config);
            Ok(())
        }
    };

    result.map_err(|err| {
        eprint!("{}", err.display_for_user());
        err.to_exit_code()
    })
}
