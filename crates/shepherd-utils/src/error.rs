use std::fmt;
use std::io;

use shepherd_runner::RunnerError;
use thiserror::Error;

/// Top-level error of the shepherd library and binary.
///
/// # Exit Code Mapping
///
/// Use [`to_exit_code()`](Self::to_exit_code) to map errors to CLI exit codes:
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration/CLI argument errors |
/// | 3 | Exit code did not match the expected one |
/// | 4 | Pumping a stream or waiting for the exit failed |
/// | 10 | Timed wait elapsed |
/// | 127 | Process could not be started |
/// | 1 | Other errors |
///
/// # Example
///
/// ```rust
/// use shepherd_utils::error::{ConfigError, ShepherdError};
/// use shepherd_utils::exit_codes::ExitCode;
///
/// let err = ShepherdError::Config(ConfigError::InvalidFile("bad toml".to_string()));
/// assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
/// eprintln!("{}", err.display_for_user());
/// ```
#[derive(Error, Debug)]
pub enum ShepherdError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Runner(#[from] RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    fn user_message(&self) -> String;

    fn context(&self) -> Option<String>;

    fn suggestions(&self) -> Vec<String>;

    fn category(&self) -> ErrorCategory;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    ProcessExecution,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::ProcessExecution => write!(f, "Process Execution"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

// ============================================================================
// ConfigError - Configuration Loading and Validation
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
            Self::ValidationFailed { errors, .. } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files are TOML with optional [runner], [dumps] and [scripts] sections."
                    .to_string(),
            ),
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "shepherd reads $SHEPHERD_HOME/config.toml, or searches for .shepherd/config.toml from the current directory upward."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => {
                Some(format!("The '{key}' option has specific format requirements."))
            }
            Self::ValidationFailed { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of the configuration file".to_string(),
                "Run 'shepherd config' to see the effective configuration".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "reader" => vec!["Use 'blocking' or 'non-blocking'".to_string()],
                "env" => vec!["Pass environment variables as KEY=VALUE".to_string()],
                _ => vec!["Remove the option to use the default value".to_string()],
            },
            Self::NotFound { .. } => vec![
                "Check the path passed to --config".to_string(),
                "Omit --config to use discovery".to_string(),
            ],
            Self::DiscoveryFailed { .. } => vec![
                "Use --config <path> to specify the configuration file explicitly".to_string(),
            ],
            Self::ValidationFailed { .. } => vec![
                "Intervals, recent_lines and the shell must be non-empty and non-zero".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

impl UserFriendlyError for RunnerError {
    fn user_message(&self) -> String {
        self.summary()
    }

    fn context(&self) -> Option<String> {
        match self {
            RunnerError::Spawn { hint, .. } => hint.clone(),
            RunnerError::Timeout { .. } => {
                Some("The wait gave up; without --kill-on-timeout the process is left running.".to_string())
            }
            _ => self.dump().map(|dump| dump.report.clone()),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            RunnerError::Spawn { .. } => vec![
                "Check that the program exists and is executable".to_string(),
                "Check the working directory passed with --cwd".to_string(),
            ],
            RunnerError::ExitCodeMismatch { .. } => {
                vec!["Use --expect <N> if this exit code is intended".to_string()]
            }
            RunnerError::Timeout { .. } => vec![
                "Increase --timeout".to_string(),
                "Use --kill-on-timeout to stop the process when the wait gives up".to_string(),
            ],
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            RunnerError::DumpWrite { .. } | RunnerError::Script { .. } => ErrorCategory::FileSystem,
            _ => ErrorCategory::ProcessExecution,
        }
    }
}

impl UserFriendlyError for ShepherdError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Runner(e) => e.user_message(),
            Self::Io(e) => format!("I/O operation failed: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Runner(e) => e.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Runner(e) => e.suggestions(),
            Self::Io(_) => vec!["Check file permissions and available disk space".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Runner(e) => e.category(),
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl ShepherdError {
    /// Error message with context and suggestions, for printing to the terminal.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }
        output
    }

    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> crate::exit_codes::ExitCode {
        use crate::exit_codes::ExitCode;

        match self {
            ShepherdError::Config(_) => ExitCode::CLI_ARGS,
            ShepherdError::Runner(runner) => match runner {
                RunnerError::Spawn { .. } => ExitCode::SPAWN_FAILURE,
                RunnerError::ExitCodeMismatch { .. } => ExitCode::EXIT_CODE_MISMATCH,
                RunnerError::Pump { .. } | RunnerError::Wait { .. } => ExitCode::IO_FAILURE,
                RunnerError::Timeout { .. } => ExitCode::TIMEOUT,
                RunnerError::DumpWrite { .. } | RunnerError::Script { .. } => ExitCode::INTERNAL,
            },
            ShepherdError::Io(_) => ExitCode::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes::ExitCode;
    use shepherd_runner::Dump;
    use std::time::Duration;

    fn dump() -> Dump {
        Dump {
            report: "Process 7 terminated with exit code 3. Expected 0.".to_string(),
            files: None,
            write_error: None,
        }
    }

    #[test]
    fn test_runner_errors_map_to_exit_codes() {
        let cases = [
            (
                RunnerError::Spawn {
                    command: "nope".to_string(),
                    reason: "not found".to_string(),
                    hint: None,
                    dump: dump(),
                },
                ExitCode::SPAWN_FAILURE,
            ),
            (
                RunnerError::ExitCodeMismatch {
                    pid: 7,
                    command: "false".to_string(),
                    actual: 3,
                    expected: 0,
                    dump: dump(),
                },
                ExitCode::EXIT_CODE_MISMATCH,
            ),
            (
                RunnerError::Timeout {
                    pid: 7,
                    timeout: Duration::from_secs(1),
                },
                ExitCode::TIMEOUT,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ShepherdError::from(err).to_exit_code(), code);
        }
    }

    #[test]
    fn test_config_errors_are_cli_errors() {
        let err = ShepherdError::from(ConfigError::InvalidValue {
            key: "reader".to_string(),
            value: "sometimes".to_string(),
        });
        assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let shown = err.display_for_user();
        assert!(shown.starts_with("Error: Configuration 'reader' has invalid value: sometimes"));
        assert!(shown.contains("  • Use 'blocking' or 'non-blocking'"));
    }

    #[test]
    fn test_mismatch_context_is_the_dump_report() {
        let err = ShepherdError::from(RunnerError::ExitCodeMismatch {
            pid: 7,
            command: "false".to_string(),
            actual: 3,
            expected: 0,
            dump: dump(),
        });
        assert_eq!(err.context().as_deref(), Some(dump().report.as_str()));
        assert!(err.display_for_user().contains("--expect"));
    }
}
