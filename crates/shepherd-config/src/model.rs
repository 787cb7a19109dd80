use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shepherd_runner::dump::DEFAULT_RECENT_LINES;
use shepherd_runner::launcher::{DEFAULT_POLL_INTERVAL, default_script_dir};
use shepherd_runner::pump::DEFAULT_IDLE_TIMEOUT;
use shepherd_runner::script::DEFAULT_SHELL;
use shepherd_runner::{DumpSettings, ExecOptions, Launcher, ReaderMode};

/// Effective configuration after applying defaults, the config file and CLI
/// overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub runner: RunnerSettings,
    pub dumps: DumpsConfig,
    pub scripts: ScriptsConfig,
    /// The config file that was loaded, if any
    pub config_path: Option<PathBuf>,
    /// Where each value came from, keyed by its `section.key` name
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// Line delivery mode as spelled in configuration files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ReaderKind {
    Blocking,
    #[default]
    NonBlocking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    pub expected_exit_code: i32,
    pub reader: ReaderKind,
    pub idle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// No timeout when unset
    pub timeout_secs: Option<u64>,
    pub destroy_on_shutdown: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            expected_exit_code: 0,
            reader: ReaderKind::default(),
            idle_timeout_ms: millis(DEFAULT_IDLE_TIMEOUT),
            poll_interval_ms: millis(DEFAULT_POLL_INTERVAL),
            timeout_secs: None,
            destroy_on_shutdown: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpsConfig {
    pub dir: PathBuf,
    pub recent_lines: usize,
}

impl Default for DumpsConfig {
    fn default() -> Self {
        Self {
            dir: DumpSettings::default_dir(),
            recent_lines: DEFAULT_RECENT_LINES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptsConfig {
    pub dir: PathBuf,
    pub shell: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            dir: default_script_dir(),
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

/// Source of a configuration value for attribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::ConfigFile(path) => write!(f, "config file ({})", path.display()),
            Self::Defaults => write!(f, "defaults"),
        }
    }
}

/// Overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub expected_exit_code: Option<i32>,
    pub reader: Option<ReaderKind>,
    pub idle_timeout_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

// ============================================================================
// TOML File Model
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlConfig {
    pub runner: Option<TomlRunner>,
    pub dumps: Option<TomlDumps>,
    pub scripts: Option<TomlScripts>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlRunner {
    pub expected_exit_code: Option<i32>,
    pub reader: Option<ReaderKind>,
    pub idle_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub destroy_on_shutdown: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlDumps {
    pub dir: Option<PathBuf>,
    pub recent_lines: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlScripts {
    pub dir: Option<PathBuf>,
    pub shell: Option<String>,
}

// ============================================================================
// Conversion Into Runner Types
// ============================================================================

impl Config {
    #[must_use]
    pub fn reader_mode(&self) -> ReaderMode {
        match self.runner.reader {
            ReaderKind::Blocking => ReaderMode::Blocking,
            ReaderKind::NonBlocking => ReaderMode::NonBlocking {
                idle: Duration::from_millis(self.runner.idle_timeout_ms),
            },
        }
    }

    /// Execution options carrying every configured runner and dump setting.
    #[must_use]
    pub fn exec_options(&self) -> ExecOptions {
        let options = ExecOptions::default()
            .expected_exit_code(self.runner.expected_exit_code)
            .reader(self.reader_mode())
            .destroy_on_shutdown(self.runner.destroy_on_shutdown)
            .dump_dir(self.dumps.dir.clone())
            .recent_lines(self.dumps.recent_lines)
            .poll_interval(Duration::from_millis(self.runner.poll_interval_ms));
        match self.runner.timeout_secs {
            Some(secs) if secs > 0 => options.timeout(Duration::from_secs(secs)),
            _ => options,
        }
    }

    /// Native launcher writing scripts as configured.
    #[must_use]
    pub fn launcher(&self) -> Launcher {
        Launcher::new()
            .script_dir(self.scripts.dir.clone())
            .shell(self.scripts.shell.clone())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            runner: RunnerSettings::default(),
            dumps: DumpsConfig::default(),
            scripts: ScriptsConfig::default(),
            config_path: None,
            source_attribution: HashMap::new(),
        }
    }

    #[test]
    fn test_exec_options_carry_settings() {
        let mut c = config();
        c.runner.expected_exit_code = 4;
        c.runner.idle_timeout_ms = 250;
        c.runner.timeout_secs = Some(30);
        c.dumps.recent_lines = 3;

        let options = c.exec_options();

        assert_eq!(options.expected_exit_code, 4);
        assert_eq!(
            options.reader,
            ReaderMode::NonBlocking {
                idle: Duration::from_millis(250)
            }
        );
        assert_eq!(options.timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.dump.recent_lines, 3);
        assert_eq!(options.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let mut c = config();
        c.runner.timeout_secs = Some(0);
        c.runner.reader = ReaderKind::Blocking;

        let options = c.exec_options();
        assert_eq!(options.timeout, None);
        assert_eq!(options.reader, ReaderMode::Blocking);
    }

    #[test]
    fn test_reader_kind_spelling() {
        assert_eq!(ReaderKind::NonBlocking.to_string(), "non-blocking");
        let parsed: TomlRunner = toml::from_str("reader = \"blocking\"").unwrap();
        assert_eq!(parsed.reader, Some(ReaderKind::Blocking));
    }
}
