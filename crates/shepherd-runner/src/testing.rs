//! Test doubles for driving managed processes without the OS.
//!
//! Available in unit tests and, through the `test-utils` feature, to
//! downstream integration tests.

use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::command_spec::CommandSpec;
use crate::native::{Signaller, SpawnedProcess, Spawner};

/// First pid handed out by a [`ScriptedSpawner`].
const FIRST_PID: u32 = 40_000;

/// A spawner whose processes print canned output and exit with a canned code.
///
/// Clones share the spawn counter and the recorded stdin.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSpawner {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stderr_failure: Option<String>,
    stdout_held_open: bool,
    exit_code: i32,
    spawn_error: Option<io::ErrorKind>,
    runtime: Duration,
    spawns: Arc<AtomicUsize>,
    stdin: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedSpawner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stdout(mut self, text: &str) -> Self {
        self.stdout = text.as_bytes().to_vec();
        self
    }

    #[must_use]
    pub fn stderr(mut self, text: &str) -> Self {
        self.stderr = text.as_bytes().to_vec();
        self
    }

    /// Reading stderr fails with `message` instead of yielding data.
    #[must_use]
    pub fn failing_stderr(mut self, message: &str) -> Self {
        self.stderr_failure = Some(message.to_string());
        self
    }

    /// After the canned output, stdout stays open for a minute, like a pipe
    /// inherited by a grandchild that outlives the process.
    #[must_use]
    pub fn stdout_held_open(mut self) -> Self {
        self.stdout_held_open = true;
        self
    }

    #[must_use]
    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    #[must_use]
    pub fn fail_spawn(mut self, kind: io::ErrorKind) -> Self {
        self.spawn_error = Some(kind);
        self
    }

    /// Keep the process alive for `runtime` unless it is signalled first.
    /// A kill ends it with 137, a termination request with 143.
    #[must_use]
    pub fn runs_for(mut self, runtime: Duration) -> Self {
        self.runtime = runtime;
        self
    }

    /// Number of spawn attempts so far, failed ones included.
    #[must_use]
    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    /// Everything written to the stdin of the spawned processes.
    #[must_use]
    pub fn stdin_received(&self) -> Vec<u8> {
        self.stdin.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Spawner for ScriptedSpawner {
    fn spawn(&self, _spec: &CommandSpec) -> io::Result<SpawnedProcess> {
        let attempt = self.spawns.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.spawn_error {
            return Err(io::Error::new(kind, "scripted spawn failure"));
        }

        let stderr: Box<dyn Read + Send> = match &self.stderr_failure {
            Some(message) => Box::new(FailingReader(message.clone())),
            None => Box::new(Cursor::new(self.stderr.clone())),
        };
        let stdout: Box<dyn Read + Send> = if self.stdout_held_open {
            Box::new(Cursor::new(self.stdout.clone()).chain(HeldOpen(HELD_OPEN_FOR)))
        } else {
            Box::new(Cursor::new(self.stdout.clone()))
        };
        let signaller = Arc::new(ScriptedSignaller::default());
        let waiter_signaller = Arc::clone(&signaller);
        let runtime = self.runtime;
        let exit_code = self.exit_code;

        Ok(SpawnedProcess {
            pid: FIRST_PID + u32::try_from(attempt).unwrap_or(u32::MAX - FIRST_PID),
            stdin: Box::new(SharedSink(Arc::clone(&self.stdin))),
            stdout,
            stderr,
            waiter: Box::new(move || Ok(waiter_signaller.wait(runtime).unwrap_or(exit_code))),
            signaller,
        })
    }
}

#[derive(Debug)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// How long a held open stdout blocks before reporting EOF.
const HELD_OPEN_FOR: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct HeldOpen(Duration);

impl Read for HeldOpen {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        std::thread::sleep(self.0);
        Ok(0)
    }
}

#[derive(Debug)]
struct FailingReader(String);

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other(self.0.clone()))
    }
}

/// Records the first signal and wakes the waiter.
#[derive(Debug, Default)]
struct ScriptedSignaller {
    signal: Mutex<Option<i32>>,
    delivered: Condvar,
}

impl ScriptedSignaller {
    /// Block for at most `runtime`; returns the exit code of a signal death.
    fn wait(&self, runtime: Duration) -> Option<i32> {
        let deadline = Instant::now() + runtime;
        let mut signal = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if signal.is_some() {
                return *signal;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            signal = self
                .delivered
                .wait_timeout(signal, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn deliver(&self, code: i32) {
        let mut signal = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        signal.get_or_insert(code);
        self.delivered.notify_all();
    }
}

impl Signaller for ScriptedSignaller {
    fn terminate(&self) -> io::Result<()> {
        self.deliver(128 + 15);
        Ok(())
    }

    fn kill(&self) -> io::Result<()> {
        self.deliver(128 + 9);
        Ok(())
    }
}
