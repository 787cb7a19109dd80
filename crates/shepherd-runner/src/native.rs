use std::fmt;
use std::io::{self, Read, Write};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::command_spec::CommandSpec;

// ============================================================================
// Spawner - Seam Between Managed Processes and the OS
// ============================================================================

/// Blocks until the native process exits and yields its exit code.
pub type ExitWaiter = Box<dyn FnOnce() -> io::Result<i32> + Send>;

/// Delivers termination requests to a spawned process.
pub trait Signaller: Send + Sync + fmt::Debug {
    /// Ask the process to terminate (SIGTERM on Unix).
    fn terminate(&self) -> io::Result<()>;

    /// Terminate the process immediately (SIGKILL on Unix, TerminateProcess on Windows).
    fn kill(&self) -> io::Result<()>;
}

/// Handles of a freshly spawned process.
pub struct SpawnedProcess {
    pub pid: u32,
    pub stdin: Box<dyn Write + Send>,
    pub stdout: Box<dyn Read + Send>,
    pub stderr: Box<dyn Read + Send>,
    pub waiter: ExitWaiter,
    pub signaller: Arc<dyn Signaller>,
}

impl fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.pid)
            .field("signaller", &self.signaller)
            .finish_non_exhaustive()
    }
}

/// Creates OS processes for managed processes.
///
/// Implementations MUST pipe all three standard streams.
pub trait Spawner: Send + Sync + fmt::Debug {
    fn spawn(&self, spec: &CommandSpec) -> io::Result<SpawnedProcess>;
}

/// Spawns real processes argv-style via [`CommandSpec::to_command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSpawner;

impl NativeSpawner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Upper bound between two exit polls of a child.
const MAX_EXIT_POLL: Duration = Duration::from_millis(20);

impl Spawner for NativeSpawner {
    fn spawn(&self, spec: &CommandSpec) -> io::Result<SpawnedProcess> {
        let mut command = spec.to_command();
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = spawn_with_retry(&mut command)?;
        let pid = child.id();
        let missing = |name: &str| io::Error::other(format!("{name} of process {pid} is not piped"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let handle = Arc::new(ChildHandle {
            pid,
            child: Mutex::new(child),
            exited: AtomicBool::new(false),
        });
        let waiter_handle = Arc::clone(&handle);

        Ok(SpawnedProcess {
            pid,
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            waiter: Box::new(move || waiter_handle.wait()),
            signaller: handle,
        })
    }
}

/// Attempts at spawning a freshly written script that is still busy.
const TEXT_BUSY_ATTEMPTS: u32 = 5;

/// Spawn `command`, retrying while the executable is still open for writing
/// by another thread (ETXTBSY).
fn spawn_with_retry(command: &mut std::process::Command) -> io::Result<Child> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Err(e) if is_text_busy(&e) && attempt < TEXT_BUSY_ATTEMPTS => {
                tracing::debug!(attempt, error = %e, "Executable busy, retrying spawn");
                attempt += 1;
                thread::sleep(Duration::from_millis(10));
            }
            other => return other,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_error: &io::Error) -> bool {
    false
}

/// Owns the native child. Signals and reaping are serialized through the
/// mutex, so a signal can never reach a recycled pid.
#[derive(Debug)]
struct ChildHandle {
    pid: u32,
    child: Mutex<Child>,
    exited: AtomicBool,
}

impl ChildHandle {
    fn wait(&self) -> io::Result<i32> {
        let mut delay = Duration::from_millis(1);
        loop {
            {
                let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(status) = child.try_wait()? {
                    self.exited.store(true, Ordering::SeqCst);
                    return Ok(exit_code(status));
                }
            }
            thread::sleep(delay);
            delay = (delay * 2).min(MAX_EXIT_POLL);
        }
    }

    fn with_live_child(&self, f: impl FnOnce(&mut Child) -> io::Result<()>) -> io::Result<()> {
        if self.exited.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        f(&mut child)
    }
}

impl Signaller for ChildHandle {
    fn terminate(&self) -> io::Result<()> {
        self.with_live_child(|child| terminate_gracefully(self.pid, child))
    }

    fn kill(&self) -> io::Result<()> {
        self.with_live_child(Child::kill)
    }
}

#[cfg(unix)]
fn terminate_gracefully(pid: u32, _child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(io::Error::other)?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(windows)]
fn terminate_gracefully(_pid: u32, child: &mut Child) -> io::Result<()> {
    use std::os::windows::io::AsRawHandle;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Threading::TerminateProcess;

    // Windows has no polite termination request for console processes
    let handle = HANDLE(child.as_raw_handle());
    unsafe { TerminateProcess(handle, 1) }.map_err(|e| io::Error::other(e.to_string()))
}

#[cfg(not(any(unix, windows)))]
fn terminate_gracefully(_pid: u32, child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Exit code of a finished process; on Unix a signal death maps to `128 + signal`.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Extra context for a failed spawn, e.g. that the program is not on `PATH`.
#[must_use]
pub fn spawn_hint(spec: &CommandSpec, error: &io::Error) -> Option<String> {
    match error.kind() {
        io::ErrorKind::NotFound => {
            if spec.program.contains(std::path::MAIN_SEPARATOR) {
                Some(format!("{} does not exist", spec.program))
            } else if which::which(&spec.program).is_err() {
                Some(format!("{} was not found on PATH", spec.program))
            } else {
                spec.cwd
                    .as_ref()
                    .filter(|cwd| !cwd.is_dir())
                    .map(|cwd| format!("working directory {} does not exist", cwd.display()))
            }
        }
        io::ErrorKind::PermissionDenied => Some(format!("{} is not executable", spec.program)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_gets_path_hint() {
        let spec = CommandSpec::new("shepherd-no-such-program-xyz");
        let err = NativeSpawner::new().spawn(&spec).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(
            spawn_hint(&spec, &err).as_deref(),
            Some("shepherd-no-such-program-xyz was not found on PATH")
        );
    }

    #[cfg(unix)]
    #[test]
    fn spawned_process_exposes_pipes_and_exit_code() {
        let spec = CommandSpec::new("sh").args(["-c", "read line; echo \"got $line\"; exit 5"]);
        let mut spawned = NativeSpawner::new().spawn(&spec).unwrap();
        assert!(spawned.pid > 0);

        spawned.stdin.write_all(b"ping\n").unwrap();
        drop(spawned.stdin);
        let mut out = String::new();
        spawned.stdout.read_to_string(&mut out).unwrap();

        assert_eq!(out, "got ping\n");
        assert_eq!((spawned.waiter)().unwrap(), 5);
        // Signalling an exited process is a no-op
        spawned.signaller.kill().unwrap();
        spawned.signaller.terminate().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn killed_process_reports_signal_exit_code() {
        let spawned = NativeSpawner::new().spawn(&CommandSpec::new("sleep").arg("30")).unwrap();
        spawned.signaller.kill().unwrap();
        assert_eq!((spawned.waiter)().unwrap(), 128 + 9);
    }

    #[cfg(unix)]
    #[test]
    fn terminated_process_reports_sigterm() {
        let spawned = NativeSpawner::new().spawn(&CommandSpec::new("sleep").arg("30")).unwrap();
        spawned.signaller.terminate().unwrap();
        assert_eq!((spawned.waiter)().unwrap(), 128 + 15);
    }
}
