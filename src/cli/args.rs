//! CLI argument definitions and parsing structures

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::CliArgs;
use shepherd_config::ReaderKind;

/// shepherd - run external programs with supervised, logged I/O
#[derive(Parser, Debug)]
#[command(name = "shepherd")]
#[command(about = "Run external programs with supervised, logged I/O and failure dumps")]
#[command(long_about = r#"
shepherd runs external programs as managed processes. Their stdin, stdout and
stderr are captured line by line into a chronological log, the exit code is
checked against the expected one, and every failure writes a dump of the
complete interaction to disk.

EXAMPLES:
  # Run a command, echoing its output
  shepherd run -- make test

  # Accept exit code 2 and stop waiting after a minute
  shepherd run --expect 2 --timeout 60 --kill-on-timeout -- ./long-job.sh

  # Merge stderr into stdout through a shell redirect
  shepherd run --redirect '2>&1' -- qemu-img info disk.raw

  # Run shell lines from a file, feeding a file to stdin
  shepherd script --stdin answers.txt setup.sh

  # Show how a command would be rendered
  shepherd render --multiline -- docker run --rm -it alpine sh

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  The config file is $SHEPHERD_HOME/config.toml, or the nearest .shepherd/config.toml
  found searching upward from CWD. Use --config to specify an explicit path.

EXIT CODES:
  0 success, 1 internal error, 2 invalid arguments or configuration,
  3 unexpected exit code, 4 I/O failure, 10 timeout, 127 program could not start
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that runs a process.
#[derive(Args, Debug, Clone, Default)]
pub struct ExecArgs {
    /// Working directory of the process
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable for the process (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Exit code that counts as success
    #[arg(long, value_name = "CODE", allow_negative_numbers = true)]
    pub expect: Option<i32>,

    /// Stop waiting after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Kill the process when the timeout elapses
    #[arg(long, requires = "timeout")]
    pub kill_on_timeout: bool,

    /// Only pass complete lines to the terminal
    #[arg(long)]
    pub blocking: bool,

    /// Show a partial line after the stream was idle this long
    #[arg(long, value_name = "MS", conflicts_with = "blocking")]
    pub idle_ms: Option<u64>,

    /// Feed this file to the process's stdin ('-' for our own stdin)
    #[arg(long, value_name = "FILE")]
    pub stdin: Option<PathBuf>,

    /// Do not echo the process's output
    #[arg(short, long)]
    pub quiet: bool,

    /// Print a JSON report instead of the process's output
    #[arg(long)]
    pub json: bool,

    /// Write the JSON report to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

impl ExecArgs {
    /// Configuration overrides carried by these options.
    #[must_use]
    pub fn cli_args(&self, config_path: Option<PathBuf>) -> CliArgs {
        CliArgs {
            config_path,
            expected_exit_code: self.expect,
            reader: self.blocking.then_some(ReaderKind::Blocking),
            idle_timeout_ms: self.idle_ms,
            timeout_secs: self.timeout,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a program and wait for it
    Run {
        #[command(flatten)]
        exec: ExecArgs,

        /// Shell redirect placed before the command, e.g. '2>&1' (repeatable)
        #[arg(long = "redirect", value_name = "TOKEN")]
        redirects: Vec<String>,

        /// Program and its arguments
        #[arg(required = true, last = true, value_name = "PROGRAM")]
        command: Vec<String>,
    },

    /// Run shell lines from a file ('-' for stdin) as a temporary script
    Script {
        #[command(flatten)]
        exec: ExecArgs,

        /// File with one shell line per line
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print how a command is rendered, and the paths it references
    Render {
        /// One argument per line with backslash continuations
        #[arg(long)]
        multiline: bool,

        /// Directory relative paths are resolved against
        #[arg(long, value_name = "DIR")]
        cwd: Option<PathBuf>,

        /// Shell redirect placed before the command (repeatable)
        #[arg(long = "redirect", value_name = "TOKEN")]
        redirects: Vec<String>,

        /// Program and its arguments
        #[arg(required = true, last = true, value_name = "PROGRAM")]
        command: Vec<String>,
    },

    /// Print the effective configuration and where each value came from
    Config,
}

impl Cli {
    /// Configuration overrides for the selected command.
    #[must_use]
    pub fn cli_args(&self) -> CliArgs {
        match &self.command {
            Commands::Run { exec, .. } | Commands::Script { exec, .. } => {
                exec.cli_args(self.config.clone())
            }
            Commands::Render { .. } | Commands::Config => CliArgs {
                config_path: self.config.clone(),
                ..CliArgs::default()
            },
        }
    }
}

/// Parse `KEY=VALUE`.
fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Build the clap parser, e.g. for tests and completions.
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
