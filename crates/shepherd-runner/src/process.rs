use crate::completion::Completion;
use crate::error::RunnerError;

// ============================================================================
// Process Trait - What Callers May Observe About a Process
// ============================================================================

/// A process as seen by its callers: either still managed or already completed.
///
/// [`Process::on_completion`] is the only authoritative completion signal.
/// Callers must not infer completion from [`Process::is_alive`], since the
/// native process exits before its output has been fully drained.
///
/// # Example
///
/// ```rust,no_run
/// use shepherd_runner::{CommandSpec, ExecOptions, Launcher, Process};
///
/// let launcher = Launcher::new();
/// let process = launcher.run(CommandSpec::new("true"), ExecOptions::default()).unwrap();
/// assert_eq!(process.wait_for().unwrap(), 0);
/// assert!(!process.is_alive());
/// ```
pub trait Process: Send + Sync {
    /// OS process id, or `None` if no process could be spawned.
    ///
    /// Starts a managed process that has not been started yet.
    fn pid(&self) -> Option<u32>;

    /// Whether the native process is still running.
    fn is_alive(&self) -> bool;

    /// Exit code once the native process has exited.
    fn exit_code(&self) -> Option<i32>;

    /// Exit code that counts as success.
    fn expected_exit_code(&self) -> i32;

    /// Handle resolving once the process has exited and all output is drained.
    fn on_completion(&self) -> Completion;

    /// Block until completion and return the exit code.
    ///
    /// # Errors
    ///
    /// Whatever failure the completion resolved with, e.g.
    /// [`RunnerError::ExitCodeMismatch`].
    fn wait_for(&self) -> Result<i32, RunnerError> {
        self.on_completion().wait().map(|completed| completed.exit_code)
    }

    /// Request graceful termination. No-op if not running.
    fn stop(&self);

    /// Request forceful termination. No-op if not running.
    fn kill(&self);
}
