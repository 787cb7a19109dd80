use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use shepherd_utils::error::ConfigError;
use tracing::debug;

use crate::model::{
    CliArgs, Config, ConfigSource, DumpsConfig, RunnerSettings, ScriptsConfig, TomlConfig,
};

/// Environment variable naming a directory that holds `config.toml`.
pub const CONFIG_HOME_ENV: &str = "SHEPHERD_HOME";

const CONFIG_DIR: &str = ".shepherd";
const CONFIG_FILE: &str = "config.toml";

/// Keys tracked in `source_attribution`.
const KEYS: &[&str] = &[
    "runner.expected_exit_code",
    "runner.reader",
    "runner.idle_timeout_ms",
    "runner.poll_interval_ms",
    "runner.timeout_secs",
    "runner.destroy_on_shutdown",
    "dumps.dir",
    "dumps.recent_lines",
    "scripts.dir",
    "scripts.shell",
];

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Searches from the current working directory when no explicit path is
    /// given in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from `start_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit config path does not exist, a config
    /// file cannot be parsed, or the result fails validation.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir)?,
        };

        let mut config = Config {
            runner: RunnerSettings::default(),
            dumps: DumpsConfig::default(),
            scripts: ScriptsConfig::default(),
            config_path: None,
            source_attribution: KEYS
                .iter()
                .map(|key| ((*key).to_string(), ConfigSource::Defaults))
                .collect::<HashMap<_, _>>(),
        };

        if let Some(path) = config_path {
            let file = Self::load_config_file(&path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            config.apply_file(file, &ConfigSource::ConfigFile(path.clone()));
            debug!(path = %path.display(), "Loaded configuration file");
            config.config_path = Some(path);
        }

        config.apply_cli(cli_args);
        config.validate()?;
        Ok(config)
    }

    /// Locate a config file: `$SHEPHERD_HOME/config.toml` first, then
    /// `.shepherd/config.toml` in `start_dir` or any parent up to the
    /// repository root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        if let Some(home) = env::var_os(CONFIG_HOME_ENV) {
            let path = PathBuf::from(home).join(CONFIG_FILE);
            if path.is_file() {
                return Ok(Some(path));
            }
            debug!(path = %path.display(), "No config file in {CONFIG_HOME_ENV}");
        }

        let mut current = Some(start_dir);
        while let Some(dir) = current {
            let path = dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if path.is_file() {
                return Ok(Some(path));
            }
            if dir.join(".git").exists() || dir.join(".hg").exists() {
                break;
            }
            current = dir.parent();
        }
        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).map_err(|e| ConfigError::InvalidFile(e.to_string()).into())
    }

    fn apply_file(&mut self, file: TomlConfig, source: &ConfigSource) {
        let mut set = |key: &str| {
            self.source_attribution
                .insert(key.to_string(), source.clone());
        };

        if let Some(runner) = file.runner {
            if let Some(code) = runner.expected_exit_code {
                self.runner.expected_exit_code = code;
                set("runner.expected_exit_code");
            }
            if let Some(reader) = runner.reader {
                self.runner.reader = reader;
                set("runner.reader");
            }
            if let Some(idle) = runner.idle_timeout_ms {
                self.runner.idle_timeout_ms = idle;
                set("runner.idle_timeout_ms");
            }
            if let Some(poll) = runner.poll_interval_ms {
                self.runner.poll_interval_ms = poll;
                set("runner.poll_interval_ms");
            }
            if let Some(timeout) = runner.timeout_secs {
                self.runner.timeout_secs = Some(timeout);
                set("runner.timeout_secs");
            }
            if let Some(destroy) = runner.destroy_on_shutdown {
                self.runner.destroy_on_shutdown = destroy;
                set("runner.destroy_on_shutdown");
            }
        }

        if let Some(dumps) = file.dumps {
            if let Some(dir) = dumps.dir {
                self.dumps.dir = dir;
                set("dumps.dir");
            }
            if let Some(lines) = dumps.recent_lines {
                self.dumps.recent_lines = lines;
                set("dumps.recent_lines");
            }
        }

        if let Some(scripts) = file.scripts {
            if let Some(dir) = scripts.dir {
                self.scripts.dir = dir;
                set("scripts.dir");
            }
            if let Some(shell) = scripts.shell {
                self.scripts.shell = shell;
                set("scripts.shell");
            }
        }
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        let mut set = |key: &str| {
            self.source_attribution
                .insert(key.to_string(), ConfigSource::Cli);
        };

        if let Some(code) = cli.expected_exit_code {
            self.runner.expected_exit_code = code;
            set("runner.expected_exit_code");
        }
        if let Some(reader) = cli.reader {
            self.runner.reader = reader;
            set("runner.reader");
        }
        if let Some(idle) = cli.idle_timeout_ms {
            self.runner.idle_timeout_ms = idle;
            set("runner.idle_timeout_ms");
        }
        if let Some(timeout) = cli.timeout_secs {
            self.runner.timeout_secs = Some(timeout);
            set("runner.timeout_secs");
        }
    }
}
