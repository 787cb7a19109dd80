//! CLI command implementations
//!
//! Each `execute_*` function handles one subcommand.

use std::fs::File;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::style::Stylize;
use tracing::{debug, info, warn};

use shepherd_runner::dump::DUMP_PREFIX;
use shepherd_runner::script::SCRIPT_PREFIX;
use shepherd_runner::{cleanup_stale, wait_with_timeout};
use shepherd_utils::atomic_write::write_file_atomic;
use shepherd_utils::logging;

use super::args::ExecArgs;
use crate::report::RunReport;
use crate::{
    CommandSpec, Config, ExecOptions, InputSource, ManagedProcess, ProcessResult, RunnerError,
    ShepherdError, processors,
};

/// Dumps and scripts older than this are removed at startup.
const STALE_AFTER: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// At most this many dump files and scripts are kept.
const MAX_KEPT_FILES: usize = 200;

// ============================================================================
// Run Command
// ============================================================================

pub(crate) fn execute_run(
    config: &Config,
    exec: &ExecArgs,
    redirects: &[String],
    command: &[String],
) -> Result<(), ShepherdError> {
    let (program, args) = command.split_first().ok_or_else(|| {
        ShepherdError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no program given",
        ))
    })?;

    let mut spec = CommandSpec::new(program.as_str())
        .args(args)
        .envs(exec.env.iter().cloned());
    for token in redirects {
        spec = spec.redirect(token.as_str());
    }
    if let Some(cwd) = &exec.cwd {
        spec = spec.cwd(cwd.clone());
    }

    let options = exec_options(config, exec)?;
    let timeout = options.timeout;
    let poll_interval = options.poll_interval;

    let span = logging::process_span(&spec.render());
    let _guard = span.enter();
    let started_at = Utc::now();
    let started = Instant::now();
    let process = config.launcher().run(spec, options)?;
    finish(&process, exec, timeout, poll_interval, started_at, started)
}

// ============================================================================
// Script Command
// ============================================================================

pub(crate) fn execute_script(
    config: &Config,
    exec: &ExecArgs,
    file: &Path,
) -> Result<(), ShepherdError> {
    let content = if file == Path::new("-") {
        if exec.stdin.as_deref() == Some(Path::new("-")) {
            return Err(ShepherdError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "stdin cannot provide both the script and its input",
            )));
        }
        let mut content = String::new();
        io::stdin().read_to_string(&mut content)?;
        content
    } else {
        std::fs::read_to_string(file)?
    };
    let lines: Vec<&str> = content.lines().collect();
    let env = exec.env.iter().cloned().collect();

    let options = exec_options(config, exec)?;
    let timeout = options.timeout;
    let poll_interval = options.poll_interval;

    let span = logging::process_span(&file.display().to_string());
    let _guard = span.enter();
    let started_at = Utc::now();
    let started = Instant::now();
    let process = config
        .launcher()
        .run_script(&lines, exec.cwd.as_deref(), &env, options)?;
    finish(&process, exec, timeout, poll_interval, started_at, started)
}

// ============================================================================
// Shared Run Helpers
// ============================================================================

fn exec_options(config: &Config, exec: &ExecArgs) -> Result<ExecOptions, ShepherdError> {
    let processor = if exec.quiet || exec.json {
        processors::tracing()
    } else {
        processors::printing()
    };
    let mut options = config.exec_options().processor(processor);

    if let Some(path) = &exec.stdin {
        let reader: Box<dyn Read + Send> = if path == Path::new("-") {
            Box::new(io::stdin())
        } else {
            Box::new(File::open(path)?)
        };
        options = options.input(InputSource::Reader(reader));
    }
    Ok(options)
}

fn finish(
    process: &ManagedProcess,
    exec: &ExecArgs,
    timeout: Option<Duration>,
    poll_interval: Duration,
    started_at: chrono::DateTime<Utc>,
    started: Instant,
) -> Result<(), ShepherdError> {
    if let Some(pid) = process.pid() {
        logging::log_process_spawned(pid, process.command());
    }

    let result = supervise(process, timeout, poll_interval, exec.kill_on_timeout);
    let elapsed = started.elapsed();
    match &result {
        Ok(completed) => {
            logging::log_process_completed(completed.pid, completed.exit_code, elapsed.as_millis());
        }
        Err(err) => logging::log_process_failed(err.pid(), &err.summary(), elapsed.as_millis()),
    }

    if exec.json || exec.report.is_some() {
        let report = RunReport::new(process, &result, started_at, elapsed);
        let json = report
            .to_json()
            .map_err(|e| ShepherdError::Io(io::Error::other(e)))?;
        if let Some(path) = &exec.report {
            write_file_atomic(path, &json)
                .map_err(|e| ShepherdError::Io(io::Error::other(format!("{e:#}"))))?;
            debug!(path = %path.display(), "Wrote run report");
        }
        if exec.json {
            println!("{json}");
        }
    }

    result.map(|_| ()).map_err(ShepherdError::from)
}

/// Wait for `process`, honoring the timeout and Ctrl-C.
///
/// On Ctrl-C the process is killed and its final result returned. When the
/// timeout elapses the process is killed only with `kill_on_timeout`, and
/// otherwise released from the shutdown hook so it outlives this program. The
/// result is a [`RunnerError::Timeout`] either way.
fn supervise(
    process: &ManagedProcess,
    timeout: Option<Duration>,
    poll_interval: Duration,
    kill_on_timeout: bool,
) -> ProcessResult {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "Failed to create async runtime, waiting without Ctrl-C handling");
            let result = match timeout {
                Some(timeout) => wait_with_timeout(process, timeout, poll_interval),
                None => process.wait_completed(),
            };
            return kill_after_timeout(process, result, kill_on_timeout);
        }
    };

    let result = runtime.block_on(async {
        let completion = process.on_completion();
        let wait = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, completion.wait_async()).await {
                    Ok(result) => result,
                    Err(_) => Err(RunnerError::Timeout {
                        pid: process.pid().unwrap_or_default(),
                        timeout: limit,
                    }),
                },
                None => completion.wait_async().await,
            }
        };

        tokio::select! {
            result = wait => kill_after_timeout(process, result, kill_on_timeout),
            Ok(()) = tokio::signal::ctrl_c() => {
                warn!(pid = process.pid().unwrap_or_default(), "Interrupted, killing process");
                process.kill();
                process.on_completion().wait_async().await
            }
        }
    });
    // The blocking waiter outlives a timed out wait
    runtime.shutdown_background();
    result
}

fn kill_after_timeout(
    process: &ManagedProcess,
    result: ProcessResult,
    kill_on_timeout: bool,
) -> ProcessResult {
    if !matches!(result, Err(RunnerError::Timeout { .. })) {
        return result;
    }
    let pid = process.pid().unwrap_or_default();
    if kill_on_timeout {
        warn!(pid = pid, "Timed out, killing process");
        process.kill();
        // Let the pumps drain so the log is complete
        match process.wait_completed() {
            Ok(completed) => debug!(pid = pid, exit_code = completed.exit_code, "Process exited after kill"),
            Err(RunnerError::ExitCodeMismatch { actual, .. }) => {
                debug!(pid = pid, exit_code = actual, "Process exited after kill");
            }
            Err(e) => warn!(pid = pid, error = %e.summary(), "Process failed after kill"),
        }
    } else if process.release_shutdown_hook() {
        info!(pid = pid, "Timed out, leaving process running");
    }
    result
}

/// Remove old dumps and scripts.
pub(crate) fn cleanup_stale_files(config: &Config) {
    for (dir, prefix) in [
        (&config.dumps.dir, DUMP_PREFIX),
        (&config.scripts.dir, SCRIPT_PREFIX),
    ] {
        if let Err(e) = cleanup_stale(dir, prefix, STALE_AFTER, MAX_KEPT_FILES) {
            warn!(dir = %dir.display(), error = %e, "Failed to clean up stale files");
        }
    }
}

// ============================================================================
// Render Command
// ============================================================================

pub(crate) fn execute_render(
    multiline: bool,
    cwd: Option<&Path>,
    redirects: &[String],
    command: &[String],
) {
    let spec = render_spec(cwd, redirects, command);
    if multiline {
        println!("{}", spec.render_multiline());
    } else {
        println!("{}", spec.render());
    }
    for path in spec.referenced_paths() {
        println!("📄 {}", path.display());
    }
}

fn render_spec(cwd: Option<&Path>, redirects: &[String], command: &[String]) -> CommandSpec {
    let (program, args) = command.split_first().map_or(("", &[][..]), |(p, a)| (p.as_str(), a));
    let mut spec = CommandSpec::new(program).args(args);
    for token in redirects {
        spec = spec.redirect(token.as_str());
    }
    if let Some(cwd) = cwd {
        spec = spec.cwd(cwd);
    }
    spec
}

// ============================================================================
// Config Command
// ============================================================================

pub(crate) fn execute_config(config: &Config) {
    let styled = io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    match &config.config_path {
        Some(path) => println!("# config file: {}", path.display()),
        None => println!("# no config file found, using defaults"),
    }
    for (key, (value, source)) in config.effective_config() {
        if styled {
            println!("{} = {}  {}", key.as_str().bold(), value, format!("({source})").dark_grey());
        } else {
            println!("{key} = {value}  ({source})");
        }
    }
}
