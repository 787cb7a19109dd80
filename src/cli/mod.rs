//! Command-line interface for shepherd
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: Main entry point and command dispatch
//! - `commands`: Command implementations and helpers
//! - `tests`: Test module (cfg(test) only)

pub mod args;
mod commands;
mod run;

#[cfg(test)]
mod tests;

pub use args::{Cli, Commands, ExecArgs, build_cli};

pub use run::{run, run_with};
