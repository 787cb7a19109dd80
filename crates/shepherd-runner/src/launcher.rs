//! Entry points for running commands.
//!
//! [`ExecOptions`] collects the per-run settings and [`Launcher`] turns a
//! [`CommandSpec`] into a [`ManagedProcess`]. Specs with redirects, and raw
//! shell lines, go through a generated script. [`wait_with_timeout`] polls a
//! process for completion and never kills it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::command_spec::CommandSpec;
use crate::completion::ProcessResult;
use crate::dump::DumpSettings;
use crate::error::RunnerError;
use crate::managed::ManagedProcess;
use crate::native::{NativeSpawner, Spawner};
use crate::processors::{self, Processor};
use crate::pump::{InputSource, ReaderMode};
use crate::script::{self, DEFAULT_SHELL};
use crate::shutdown::ShutdownRegistry;

// ============================================================================
// ExecOptions - Per-Run Settings
// ============================================================================

/// Called once with the final result after a process completed.
pub type TerminationCallback = Box<dyn FnOnce(&ProcessResult) + Send>;

/// Default interval between two completion checks of a timed wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to run and supervise one process.
///
/// # Example
///
/// ```rust
/// use shepherd_runner::{ExecOptions, ReaderMode};
/// use std::time::Duration;
///
/// let options = ExecOptions::default()
///     .expected_exit_code(2)
///     .timeout(Duration::from_secs(30))
///     .reader(ReaderMode::Blocking);
///
/// assert_eq!(options.timeout, Some(Duration::from_secs(30)));
/// ```
pub struct ExecOptions {
    /// Exit code that counts as success
    pub expected_exit_code: i32,
    /// Give up waiting after this long; the process is not killed
    pub timeout: Option<Duration>,
    pub termination_callback: Option<TerminationCallback>,
    pub reader: ReaderMode,
    pub input: InputSource,
    pub processor: Processor,
    /// Kill the process if the host program exits first
    pub destroy_on_shutdown: bool,
    pub dump: DumpSettings,
    pub poll_interval: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            expected_exit_code: 0,
            timeout: None,
            termination_callback: None,
            reader: ReaderMode::default(),
            input: InputSource::Empty,
            processor: processors::noop(),
            destroy_on_shutdown: true,
            dump: DumpSettings::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ExecOptions {
    #[must_use]
    pub fn expected_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = code;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn on_termination(mut self, callback: impl FnOnce(&ProcessResult) + Send + 'static) -> Self {
        self.termination_callback = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn reader(mut self, reader: ReaderMode) -> Self {
        self.reader = reader;
        self
    }

    #[must_use]
    pub fn input(mut self, input: InputSource) -> Self {
        self.input = input;
        self
    }

    #[must_use]
    pub fn processor(mut self, processor: Processor) -> Self {
        self.processor = processor;
        self
    }

    #[must_use]
    pub fn destroy_on_shutdown(mut self, destroy: bool) -> Self {
        self.destroy_on_shutdown = destroy;
        self
    }

    #[must_use]
    pub fn dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump.dir = dir.into();
        self
    }

    #[must_use]
    pub fn recent_lines(mut self, lines: usize) -> Self {
        self.dump.recent_lines = lines;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl fmt::Debug for ExecOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecOptions")
            .field("expected_exit_code", &self.expected_exit_code)
            .field("timeout", &self.timeout)
            .field("reader", &self.reader)
            .field("input", &self.input)
            .field("destroy_on_shutdown", &self.destroy_on_shutdown)
            .field("dump", &self.dump)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Launcher - Entry Point for Running Processes
// ============================================================================

/// Starts managed processes.
///
/// # Example
///
/// ```rust,no_run
/// use shepherd_runner::{CommandSpec, ExecOptions, Launcher};
///
/// let launcher = Launcher::new();
/// let completed = launcher
///     .run_and_wait(CommandSpec::new("echo").arg("hello"), ExecOptions::default())
///     .unwrap();
/// assert_eq!(completed.output(), "hello");
/// ```
#[derive(Clone)]
pub struct Launcher {
    spawner: Arc<dyn Spawner>,
    registry: &'static ShutdownRegistry,
    script_dir: PathBuf,
    shell: String,
}

impl Launcher {
    /// Launcher for native processes, cleaned up through the global registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_spawner(Arc::new(NativeSpawner::new()))
    }

    #[must_use]
    pub fn with_spawner(spawner: Arc<dyn Spawner>) -> Self {
        Self {
            spawner,
            registry: ShutdownRegistry::global(),
            script_dir: default_script_dir(),
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    #[must_use]
    pub fn registry(mut self, registry: &'static ShutdownRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Directory temporary scripts are written to.
    #[must_use]
    pub fn script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = dir.into();
        self
    }

    /// Interpreter named in the shebang of temporary scripts.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Create a managed process without starting it.
    #[must_use]
    pub fn prepare(&self, spec: CommandSpec, options: ExecOptions) -> ManagedProcess {
        ManagedProcess::new(spec, options, Arc::clone(&self.spawner), self.registry)
    }

    /// Start `spec` and return right away.
    ///
    /// A spec with redirects is run through a temporary script.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Script`] if that script cannot be written. Everything
    /// else is reported through the process's completion.
    pub fn run(&self, spec: CommandSpec, options: ExecOptions) -> Result<ManagedProcess, RunnerError> {
        let spec = if spec.needs_shell() {
            self.wrap_in_script(&spec)?
        } else {
            spec
        };
        let process = self.prepare(spec, options);
        process.start();
        Ok(process)
    }

    /// Run `lines` as a temporary shell script inside `cwd`.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Script`] if the script cannot be written.
    pub fn run_script<S: AsRef<str>>(
        &self,
        lines: &[S],
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
        options: ExecOptions,
    ) -> Result<ManagedProcess, RunnerError> {
        let path = script::write_script(&self.script_dir, lines, cwd, &self.shell)?;
        let spec = CommandSpec::new(path.to_string_lossy()).envs(env.clone());
        self.run(spec, options)
    }

    /// Run `spec` and wait for its completion, honoring `options.timeout`.
    ///
    /// # Errors
    ///
    /// The failure the process completed with, or [`RunnerError::Timeout`].
    pub fn run_and_wait(&self, spec: CommandSpec, options: ExecOptions) -> ProcessResult {
        let timeout = options.timeout;
        let poll_interval = options.poll_interval;
        let process = self.run(spec, options)?;
        match timeout {
            Some(timeout) => wait_with_timeout(&process, timeout, poll_interval),
            None => process.wait_completed(),
        }
    }

    fn wrap_in_script(&self, spec: &CommandSpec) -> Result<CommandSpec, RunnerError> {
        let path = script::write_script(
            &self.script_dir,
            &[spec.render()],
            spec.cwd.as_deref(),
            &self.shell,
        )?;
        debug!(script = %path.display(), command = %spec, "Running command with redirects through script");
        Ok(CommandSpec::new(path.to_string_lossy()).envs(spec.env.clone()))
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launcher")
            .field("spawner", &self.spawner)
            .field("script_dir", &self.script_dir)
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

/// `<system temp>/shepherd/scripts`
#[must_use]
pub fn default_script_dir() -> PathBuf {
    DumpSettings::default_dir().join("scripts")
}

/// Wait for `process` by polling its completion every `poll_interval`.
///
/// A zero `timeout` waits without limit.
///
/// # Errors
///
/// [`RunnerError::Timeout`] when `timeout` elapses first. The process keeps
/// running; kill it explicitly if needed. Otherwise the failure the process
/// completed with.
pub fn wait_with_timeout(
    process: &ManagedProcess,
    timeout: Duration,
    poll_interval: Duration,
) -> ProcessResult {
    let completion = process.on_completion();
    if timeout.is_zero() {
        return completion.wait();
    }
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(result) = completion.try_get() {
            return result;
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(RunnerError::Timeout {
                pid: process.pid().unwrap_or_default(),
                timeout,
            });
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
}
