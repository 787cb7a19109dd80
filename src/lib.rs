//! shepherd - supervised external processes with line-accurate I/O capture
//!
//! shepherd runs external programs as managed processes: stdin, stdout and
//! stderr are pumped concurrently into a chronological log, the exit code is
//! checked against the expected one, and every failure comes with a dump of
//! the complete interaction on disk.
//!
//! shepherd can be used in two ways:
//! - **CLI**: run `shepherd run -- <program> [args]...`
//! - **Library**: embed the launcher in your application
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Run a command, echoing its output
//! shepherd run -- make test
//!
//! # Accept exit code 1, give up waiting after 30 seconds
//! shepherd run --expect 1 --timeout 30 -- ./flaky.sh
//!
//! # Write a JSON report of the run
//! shepherd run --quiet --report run.json -- cargo --version
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use shepherd::{CommandSpec, ExecOptions, Launcher};
//!
//! let completed = Launcher::new()
//!     .run_and_wait(
//!         CommandSpec::new("git").args(["status", "--short"]),
//!         ExecOptions::default(),
//!     )
//!     .unwrap();
//! println!("{}", completed.output());
//! ```
//!
//! # Stable Public API
//!
//! - [`Launcher`], [`ExecOptions`] and [`CommandSpec`] - starting processes
//! - [`ManagedProcess`], [`Process`] and [`Completion`] - supervising them
//! - [`CompletedProcess`], [`IoRecord`] and [`Dump`] - results
//! - [`Config`] - configuration management
//! - [`ShepherdError`] and [`ExitCode`] - errors and CLI exit codes

// ============================================================================
// Stable Public API - covered by semver guarantees
// ============================================================================

pub use shepherd_runner::{
    Channel, CommandSpec, CompletedProcess, Completion, Dump, DumpFiles, ExecOptions, InputSource,
    IoLog, IoRecord, Launcher, LoggedProcess, ManagedProcess, Process, ProcessResult,
    ProcessState, ReaderMode, RunnerError, processors,
};

pub use shepherd_config::{CliArgs, Config, ConfigSource};

pub use shepherd_utils::error::{ConfigError, ErrorCategory, ShepherdError, UserFriendlyError};

pub use shepherd_utils::exit_codes::ExitCode;

// ============================================================================
// Internal Modules - accessible but not covered by semver
// ============================================================================

#[doc(hidden)]
pub use shepherd_runner as runner;

#[doc(hidden)]
pub use shepherd_utils::{atomic_write, logging};

#[cfg(any(test, feature = "test-utils"))]
pub use shepherd_utils::test_support;

#[cfg(any(test, feature = "test-utils"))]
pub use shepherd_runner::testing;

pub mod cli;
pub mod report;

pub use report::{RunReport, RunStatus};
