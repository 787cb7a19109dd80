//! Configuration management for shepherd
//!
//! Hierarchical configuration with discovery and precedence CLI > file >
//! defaults. Configuration files are TOML with optional `[runner]`, `[dumps]`
//! and `[scripts]` sections:
//!
//! ```toml
//! [runner]
//! expected_exit_code = 0
//! reader = "non-blocking"
//! idle_timeout_ms = 500
//! timeout_secs = 300
//!
//! [dumps]
//! dir = "/var/tmp/shepherd"
//! recent_lines = 20
//!
//! [scripts]
//! shell = "/bin/bash"
//! ```

mod discovery;
mod model;
mod sources;
mod validation;

pub use discovery::CONFIG_HOME_ENV;
pub use model::{
    CliArgs, Config, ConfigSource, DumpsConfig, ReaderKind, RunnerSettings, ScriptsConfig,
};
