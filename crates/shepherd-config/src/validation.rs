use shepherd_utils::error::ConfigError;

use crate::model::Config;

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        };

        if self.runner.idle_timeout_ms == 0 {
            return invalid("runner.idle_timeout_ms", "must be greater than 0");
        }
        if self.runner.poll_interval_ms == 0 {
            return invalid("runner.poll_interval_ms", "must be greater than 0");
        }
        if self.dumps.recent_lines == 0 {
            return invalid("dumps.recent_lines", "must be greater than 0");
        }
        if self.dumps.dir.as_os_str().is_empty() {
            return invalid("dumps.dir", "must not be empty");
        }
        if self.scripts.dir.as_os_str().is_empty() {
            return invalid("scripts.dir", "must not be empty");
        }
        if self.scripts.shell.trim().is_empty() {
            return invalid("scripts.shell", "must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CliArgs, ConfigSource};
    use serial_test::serial;
    use std::collections::HashMap;

    fn config() -> Config {
        Config {
            runner: Default::default(),
            dumps: Default::default(),
            scripts: Default::default(),
            config_path: None,
            source_attribution: HashMap::<String, ConfigSource>::new(),
        }
    }

    fn invalid_key(config: &Config) -> Option<String> {
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => Some(key),
            _ => None,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let mut c = config();
        c.runner.idle_timeout_ms = 0;
        assert_eq!(invalid_key(&c).as_deref(), Some("runner.idle_timeout_ms"));

        let mut c = config();
        c.runner.poll_interval_ms = 0;
        assert_eq!(invalid_key(&c).as_deref(), Some("runner.poll_interval_ms"));
    }

    #[test]
    fn test_zero_recent_lines_and_blank_shell_are_rejected() {
        let mut c = config();
        c.dumps.recent_lines = 0;
        assert_eq!(invalid_key(&c).as_deref(), Some("dumps.recent_lines"));

        let mut c = config();
        c.scripts.shell = "  ".to_string();
        assert_eq!(invalid_key(&c).as_deref(), Some("scripts.shell"));
    }

    #[test]
    #[serial]
    fn test_cli_idle_of_zero_fails_discovery() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join(".git")).unwrap();
        let cli = CliArgs {
            idle_timeout_ms: Some(0),
            ..CliArgs::default()
        };
        assert!(Config::discover_from(root.path(), &cli).is_err());
    }
}
