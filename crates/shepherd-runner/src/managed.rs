//! The managed process: a lazily started native process with logged I/O and a
//! single completion signal.
//!
//! # Lifecycle
//!
//! ```text
//! Unstarted ──touch──▶ Starting ──spawned──▶ Running ──exit + drained──▶ CompletedMatching
//!                          │                    │                      ├▶ CompletedMismatching
//!                          └──spawn failed──────┴──pump/wait failed────┴▶ Failed
//! ```
//!
//! Nothing happens at the OS level until the process is first touched:
//! [`ManagedProcess::start`], [`ManagedProcess::pid`], [`ManagedProcess::is_alive`],
//! [`ManagedProcess::write_input`], [`ManagedProcess::on_completion`] or
//! [`ManagedProcess::wait_for`]. The spawn happens under the lifecycle lock,
//! so concurrent touches still spawn exactly one OS process.
//!
//! Completion is resolved by the exit waiter only after the native exit has
//! been observed and every pump has drained. The termination callback runs
//! once, right after.

use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command_spec::CommandSpec;
use crate::completed::CompletedProcess;
use crate::completion::{Completion, ProcessResult};
use crate::dump::{Dump, DumpSettings};
use crate::error::RunnerError;
use crate::io_log::IoLog;
use crate::io_record::{Channel, IoRecord};
use crate::launcher::{ExecOptions, TerminationCallback};
use crate::native::{self, ExitWaiter, Signaller, SpawnedProcess, Spawner};
use crate::pool;
use crate::process::Process;
use crate::processors::Processor;
use crate::pump::{InputSource, Pipes, PumpFailure, PumpSet, ReaderMode};
use crate::shutdown::{HookError, HookId, ShutdownRegistry};

/// How long the input feeder may keep running after the process exited.
const INPUT_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ProcessState {
    Unstarted,
    Starting,
    Running,
    CompletedMatching,
    CompletedMismatching,
    Failed,
}

impl ProcessState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::CompletedMatching
                | ProcessState::CompletedMismatching
                | ProcessState::Failed
        )
    }
}

struct Lifecycle {
    state: ProcessState,
    pid: Option<u32>,
    exit_code: Option<i32>,
    signaller: Option<Arc<dyn Signaller>>,
    hook: Option<HookId>,
    input: Option<InputSource>,
}

struct Inner {
    spec: CommandSpec,
    command: String,
    expected_exit_code: i32,
    reader: ReaderMode,
    processor: Processor,
    destroy_on_shutdown: bool,
    dump: DumpSettings,
    spawner: Arc<dyn Spawner>,
    registry: &'static ShutdownRegistry,
    log: Arc<IoLog>,
    disabled: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    stdin: Mutex<Option<Box<dyn Write + Send>>>,
    termination_callback: Mutex<Option<TerminationCallback>>,
    completion: Completion,
}

/// A native process whose streams are pumped into an [`IoLog`].
///
/// Cloning yields another handle to the same process.
#[derive(Clone)]
pub struct ManagedProcess {
    inner: Arc<Inner>,
}

/// How a running process ended, before it is checked against expectations.
enum Outcome {
    SpawnFailed(io::Error),
    Exited(i32),
    WaitFailed(io::Error),
    PumpFailed(PumpFailure),
}

impl ManagedProcess {
    /// Create an unstarted process. No OS resources are touched.
    pub(crate) fn new(
        spec: CommandSpec,
        options: ExecOptions,
        spawner: Arc<dyn Spawner>,
        registry: &'static ShutdownRegistry,
    ) -> Self {
        let command = spec.render();
        let inner = Inner {
            command,
            expected_exit_code: options.expected_exit_code,
            reader: options.reader,
            processor: options.processor,
            destroy_on_shutdown: options.destroy_on_shutdown,
            dump: options.dump,
            spawner,
            registry,
            log: Arc::new(IoLog::new()),
            disabled: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle {
                state: ProcessState::Unstarted,
                pid: None,
                exit_code: None,
                signaller: None,
                hook: None,
                input: Some(options.input),
            }),
            stdin: Mutex::new(None),
            termination_callback: Mutex::new(options.termination_callback),
            completion: Completion::new(),
            spec,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Spawn the native process if that has not happened yet.
    pub fn start(&self) -> &Self {
        self.ensure_started();
        self
    }

    /// Current lifecycle state. Does not start the process.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.inner.lifecycle().state
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.ensure_started();
        self.inner.lifecycle().pid
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.ensure_started();
        let lifecycle = self.inner.lifecycle();
        lifecycle.state == ProcessState::Running && lifecycle.exit_code.is_none()
    }

    /// Exit code once the native process exited. Does not start the process.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.inner.lifecycle().exit_code
    }

    #[must_use]
    pub fn expected_exit_code(&self) -> i32 {
        self.inner.expected_exit_code
    }

    #[must_use]
    pub fn spec(&self) -> &CommandSpec {
        &self.inner.spec
    }

    /// The rendered command line.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.inner.command
    }

    /// The log of this process. Readable at any time, also after completion.
    #[must_use]
    pub fn io_log(&self) -> Arc<IoLog> {
        Arc::clone(&self.inner.log)
    }

    pub fn on_completion(&self) -> Completion {
        self.ensure_started();
        self.inner.completion.clone()
    }

    /// Block until completion and return the exit code.
    ///
    /// # Errors
    ///
    /// The failure the process completed with.
    pub fn wait_for(&self) -> Result<i32, RunnerError> {
        self.on_completion().wait().map(|completed| completed.exit_code)
    }

    /// Block until completion and return the snapshot.
    ///
    /// # Errors
    ///
    /// The failure the process completed with.
    pub fn wait_completed(&self) -> ProcessResult {
        self.on_completion().wait()
    }

    /// Write to stdin of a process started with [`InputSource::Interactive`].
    ///
    /// # Errors
    ///
    /// [`io::ErrorKind::NotConnected`] if stdin is not open for interactive
    /// input, or whatever writing to the pipe fails with.
    pub fn write_input(&self, bytes: &[u8]) -> io::Result<()> {
        self.ensure_started();
        let mut stdin = self.inner.stdin.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(stdin) = stdin.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("stdin of {} is not open for input", self.inner.command),
            ));
        };
        stdin.write_all(bytes)?;
        stdin.flush()
    }

    /// Close stdin of an interactive process, signalling end of input.
    pub fn close_input(&self) {
        self.inner
            .stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Request graceful termination. No-op unless running.
    pub fn stop(&self) {
        self.signal(false);
    }

    /// Terminate immediately. No-op unless running.
    pub fn kill(&self) {
        self.signal(true);
    }

    /// Keep the process alive past the exit of the host program, even though
    /// it was started with `destroy_on_shutdown`.
    ///
    /// Returns `true` if a registration was released.
    pub fn release_shutdown_hook(&self) -> bool {
        let hook = self.inner.lifecycle().hook.take();
        hook.is_some_and(|id| self.inner.registry.deregister(id))
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.inner.disabled.load(Ordering::SeqCst)
    }

    /// Hand a reassembled line to the processor unless the process was disabled.
    pub(crate) fn dispatch(&self, channel: Channel, line: &[u8]) {
        if self.is_disabled() {
            return;
        }
        let record = IoRecord::from_bytes(channel, line);
        (self.inner.processor)(self, &record);
    }

    fn signal(&self, kill: bool) {
        let signaller = {
            let lifecycle = self.inner.lifecycle();
            if lifecycle.state != ProcessState::Running || lifecycle.exit_code.is_some() {
                return;
            }
            self.inner.disabled.store(true, Ordering::SeqCst);
            lifecycle.signaller.clone()
        };
        let Some(signaller) = signaller else {
            return;
        };
        let result = if kill {
            signaller.kill()
        } else {
            signaller.terminate()
        };
        if let Err(e) = result {
            warn!(command = %self.inner.command, kill = kill, error = %e, "Failed to signal process");
        }
    }

    fn ensure_started(&self) {
        let mut lifecycle = self.inner.lifecycle();
        if lifecycle.state != ProcessState::Unstarted {
            return;
        }
        lifecycle.state = ProcessState::Starting;

        let log = &self.inner.log;
        log.add_message(Channel::Meta, &format!("Executing {}", self.inner.command));
        for path in self.inner.spec.referenced_paths() {
            log.add_message(Channel::Meta, &format!("📄 {}", path.display()));
        }

        let spawned = match self.inner.spawner.spawn(&self.inner.spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                lifecycle.state = ProcessState::Failed;
                drop(lifecycle);
                self.complete(Outcome::SpawnFailed(e));
                return;
            }
        };

        let SpawnedProcess {
            pid,
            stdin,
            stdout,
            stderr,
            waiter,
            signaller,
        } = spawned;
        info!(pid = pid, command = %self.inner.command, "Spawned process");

        lifecycle.pid = Some(pid);
        lifecycle.signaller = Some(Arc::clone(&signaller));
        lifecycle.state = ProcessState::Running;
        if self.inner.destroy_on_shutdown {
            match self.inner.registry.register(Arc::clone(&signaller)) {
                Ok(id) => lifecycle.hook = Some(id),
                Err(HookError::ShuttingDown) => {
                    debug!(pid = pid, "Shutdown in progress, process not registered for cleanup");
                }
            }
        }

        let input = lifecycle.input.take().unwrap_or_default();
        let pipes = Pipes {
            stdin,
            stdout,
            stderr,
        };
        let started = PumpSet::start(self, input, pipes, self.inner.reader).and_then(|(pumps, stdin)| {
            *self.inner.stdin.lock().unwrap_or_else(PoisonError::into_inner) = stdin;
            let process = self.clone();
            pool::spawn(move || process.await_exit(waiter, pumps))
        });
        drop(lifecycle);

        if let Err(e) = started {
            warn!(pid = pid, error = %e, "Failed to start pumps, killing process");
            if let Err(kill_error) = signaller.kill() {
                warn!(pid = pid, error = %kill_error, "Failed to kill process after pump start failure");
            }
            self.complete(Outcome::PumpFailed(PumpFailure {
                channel: Channel::Output,
                error: e,
            }));
        }
    }

    /// Runs on the pool: wait for the native exit, then for the pumps.
    fn await_exit(&self, waiter: ExitWaiter, pumps: PumpSet) {
        let exit = waiter();
        if let Ok(code) = exit {
            self.inner.lifecycle().exit_code = Some(code);
        }
        let pumped = pumps.join(INPUT_GRACE);
        self.inner.log.flush();

        let outcome = match (exit, pumped) {
            (Err(e), _) => Outcome::WaitFailed(e),
            (Ok(_), Err(failure)) => Outcome::PumpFailed(failure),
            (Ok(code), Ok(())) => Outcome::Exited(code),
        };
        self.complete(outcome);
    }

    /// Fold `outcome` into the final state, resolve the completion and run
    /// the termination callback.
    fn complete(&self, outcome: Outcome) {
        let pid = self.inner.lifecycle().pid;
        let inner = &*self.inner;
        let command = inner.command.clone();

        let (state, result): (ProcessState, ProcessResult) = match outcome {
            Outcome::Exited(code) if code == inner.expected_exit_code => {
                let pid = pid.unwrap_or_default();
                self.meta(&format!("Process {pid} terminated successfully."));
                let completed = CompletedProcess {
                    pid,
                    exit_code: code,
                    command,
                    all: inner.log.history(),
                };
                (ProcessState::CompletedMatching, Ok(completed))
            }
            Outcome::Exited(code) => {
                let pid = pid.unwrap_or_default();
                let expected = inner.expected_exit_code;
                let message =
                    format!("Process {pid} terminated with exit code {code}. Expected {expected}.");
                let dump = self.fail_with(&message, pid);
                let error = RunnerError::ExitCodeMismatch {
                    pid,
                    command,
                    actual: code,
                    expected,
                    dump,
                };
                (ProcessState::CompletedMismatching, Err(error))
            }
            Outcome::PumpFailed(failure) => {
                let pid = pid.unwrap_or_default();
                let message = format!("Process {pid} failed. {failure}");
                let dump = self.fail_with(&message, pid);
                let error = RunnerError::Pump {
                    pid,
                    command,
                    channel: failure.channel.stream_label(),
                    source: Arc::new(failure.error),
                    dump,
                };
                (ProcessState::Failed, Err(error))
            }
            Outcome::WaitFailed(e) => {
                let pid = pid.unwrap_or_default();
                let message = format!("Process {pid} failed. Waiting for its exit failed: {e}");
                let dump = self.fail_with(&message, pid);
                let error = RunnerError::Wait {
                    pid,
                    command,
                    source: Arc::new(e),
                    dump,
                };
                (ProcessState::Failed, Err(error))
            }
            Outcome::SpawnFailed(e) => {
                let hint = native::spawn_hint(&inner.spec, &e);
                let mut message = format!("Failed to start {command}: {e}");
                if let Some(hint) = &hint {
                    message.push_str(&format!(" ({hint})"));
                }
                let dump = self.fail_with(&message, 0);
                let error = RunnerError::Spawn {
                    command,
                    reason: e.to_string(),
                    hint,
                    dump,
                };
                (ProcessState::Failed, Err(error))
            }
        };

        let hook = {
            let mut lifecycle = inner.lifecycle();
            lifecycle.state = state;
            lifecycle.signaller = None;
            lifecycle.hook.take()
        };
        inner.stdin.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(id) = hook {
            inner.registry.deregister(id);
        }

        match &result {
            Ok(completed) => info!(pid = completed.pid, exit_code = completed.exit_code, "Process completed"),
            Err(e) => warn!(pid = e.pid(), error = %e.summary(), "Process failed"),
        }

        if !inner.completion.resolve(result.clone()) {
            debug!(command = %inner.command, "Completion already resolved");
            return;
        }
        self.run_termination_callback(&result);
    }

    /// Narrate `message`, dump the log including it, then narrate where the
    /// dump went. The dump files themselves end with `message`.
    fn fail_with(&self, message: &str, pid: u32) -> Dump {
        self.meta(message);
        let dump = Dump::capture(&self.inner.log, message, pid, &self.inner.dump);
        self.meta(&dump.location());
        dump
    }

    fn meta(&self, message: &str) {
        self.inner.log.add_message(Channel::Meta, message);
    }

    fn run_termination_callback(&self, result: &ProcessResult) {
        let callback = self
            .inner
            .termination_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(result))) {
                warn!(
                    command = %self.inner.command,
                    panic = %pool::panic_message(payload.as_ref()),
                    "Termination callback panicked"
                );
            }
        }
    }
}

impl Inner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Process for ManagedProcess {
    fn pid(&self) -> Option<u32> {
        ManagedProcess::pid(self)
    }

    fn is_alive(&self) -> bool {
        ManagedProcess::is_alive(self)
    }

    fn exit_code(&self) -> Option<i32> {
        ManagedProcess::exit_code(self)
    }

    fn expected_exit_code(&self) -> i32 {
        ManagedProcess::expected_exit_code(self)
    }

    fn on_completion(&self) -> Completion {
        ManagedProcess::on_completion(self)
    }

    fn stop(&self) {
        ManagedProcess::stop(self);
    }

    fn kill(&self) {
        ManagedProcess::kill(self);
    }
}

impl fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.inner.lifecycle();
        f.debug_struct("ManagedProcess")
            .field("command", &self.inner.command)
            .field("state", &lifecycle.state)
            .field("pid", &lifecycle.pid)
            .field("exit_code", &lifecycle.exit_code)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.inner.lifecycle();
        match lifecycle.pid {
            Some(pid) => write!(f, "{} (pid {pid}, {})", self.inner.command, lifecycle.state),
            None => write!(f, "{} ({})", self.inner.command, lifecycle.state),
        }
    }
}

#[cfg(test)]
mod tests {
    //! WHITE-BOX TESTS: state transitions against a scripted spawner.
    use super::*;
    use crate::launcher::Launcher;
    use crate::processors;
    use crate::testing::ScriptedSpawner;
    use std::sync::atomic::AtomicUsize;

    fn leaked_registry() -> &'static ShutdownRegistry {
        Box::leak(Box::new(ShutdownRegistry::new()))
    }

    fn launcher(spawner: &ScriptedSpawner) -> Launcher {
        Launcher::with_spawner(Arc::new(spawner.clone())).registry(leaked_registry())
    }

    fn options(dir: &std::path::Path) -> ExecOptions {
        ExecOptions::default()
            .reader(ReaderMode::Blocking)
            .dump_dir(dir)
    }

    #[test]
    fn construction_does_not_spawn() {
        let spawner = ScriptedSpawner::new().stdout("hi\n");
        let dir = tempfile::tempdir().unwrap();
        let process = launcher(&spawner).prepare(CommandSpec::new("scripted"), options(dir.path()));

        assert_eq!(process.state(), ProcessState::Unstarted);
        assert_eq!(process.exit_code(), None);
        process.kill();
        process.stop();
        assert_eq!(spawner.spawn_count(), 0);

        assert!(process.pid().is_some());
        assert_eq!(spawner.spawn_count(), 1);
        process.wait_for().unwrap();
        assert_eq!(spawner.spawn_count(), 1);
    }

    #[test]
    fn matching_exit_resolves_with_snapshot() {
        let spawner = ScriptedSpawner::new().stdout("one\ntwo").stderr("warn\n");
        let dir = tempfile::tempdir().unwrap();
        let process = launcher(&spawner).prepare(CommandSpec::new("scripted"), options(dir.path()));

        let completed = process.wait_completed().unwrap();

        assert_eq!(process.state(), ProcessState::CompletedMatching);
        assert_eq!(completed.output(), "one\ntwo");
        assert_eq!(completed.error(), "warn");
        assert!(completed.meta().starts_with("Executing scripted"));
        assert!(completed.meta().ends_with("terminated successfully."));
        assert!(!process.is_alive());
    }

    #[test]
    fn exit_code_gating() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new().exit_code(3);

        let mismatching =
            launcher(&spawner).prepare(CommandSpec::new("scripted"), options(dir.path()));
        match mismatching.wait_for().unwrap_err() {
            RunnerError::ExitCodeMismatch {
                actual,
                expected,
                dump,
                ..
            } => {
                assert_eq!((actual, expected), (3, 0));
                let plain = dump.files.unwrap().plain;
                let meta: Vec<String> = mismatching
                    .io_log()
                    .history()
                    .into_iter()
                    .filter(|r| r.channel == Channel::Meta)
                    .map(|r| r.text)
                    .collect();
                let last = meta.last().unwrap();
                assert!(last.contains(&plain.display().to_string()), "{meta:?}");
                assert!(meta[meta.len() - 2].ends_with("Expected 0."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mismatching.state(), ProcessState::CompletedMismatching);

        let matching = launcher(&spawner).prepare(
            CommandSpec::new("scripted"),
            options(dir.path()).expected_exit_code(3),
        );
        assert_eq!(matching.wait_for().unwrap(), 3);
    }

    #[test]
    fn spawn_failure_fails_with_dump_and_runs_callback() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new().fail_spawn(io::ErrorKind::PermissionDenied);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let process = launcher(&spawner).prepare(
            CommandSpec::new("scripted"),
            options(dir.path()).on_termination(move |result| {
                assert!(result.is_err());
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(process.pid(), None);
        assert_eq!(process.state(), ProcessState::Failed);
        let err = process.wait_for().unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
        assert!(err.dump().unwrap().is_persisted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pump_failure_is_labelled_with_channel() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new().stdout("partial\n").failing_stderr("device unplugged");
        let process = launcher(&spawner).prepare(CommandSpec::new("scripted"), options(dir.path()));

        match process.wait_for().unwrap_err() {
            RunnerError::Pump { channel, dump, .. } => {
                assert_eq!(channel, "stderr");
                assert!(dump.report.contains("An error occurred while processing stderr"));
                assert!(dump.report.contains("partial"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(process.state(), ProcessState::Failed);
    }

    #[test]
    fn processor_sees_each_line_once() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new().stdout("a\nb\n").stderr("c\n");
        let (processor, seen) = processors::collecting();
        let process = launcher(&spawner).prepare(
            CommandSpec::new("scripted"),
            options(dir.path()).processor(processor),
        );
        process.wait_for().unwrap();

        let mut texts: Vec<_> = seen.lock().unwrap().iter().map(|r| r.text.clone()).collect();
        texts.sort();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn kill_is_idempotent_and_disables_processor() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new().runs_for(Duration::from_secs(30));
        let process = launcher(&spawner).prepare(CommandSpec::new("scripted"), options(dir.path()));

        process.start();
        assert!(process.is_alive());
        process.kill();
        process.kill();
        process.stop();

        assert!(process.wait_for().is_err());
        assert!(process.is_disabled());
        assert!(!process.is_alive());
        // Signalling after completion is a no-op
        process.kill();
    }

    #[test]
    fn kill_completes_while_stdout_is_held_open() {
        let dir = tempfile::tempdir().unwrap();
        for reader in [ReaderMode::Blocking, ReaderMode::default()] {
            let spawner = ScriptedSpawner::new()
                .stdout("before kill\n")
                .stdout_held_open()
                .runs_for(Duration::from_secs(30));
            let process = launcher(&spawner).prepare(
                CommandSpec::new("scripted"),
                options(dir.path()).reader(reader),
            );

            process.start();
            std::thread::sleep(Duration::from_millis(100));
            let killed_at = std::time::Instant::now();
            process.kill();
            let err = process.wait_for().unwrap_err();

            assert!(killed_at.elapsed() < Duration::from_secs(2), "{reader:?}");
            assert!(matches!(err, RunnerError::ExitCodeMismatch { actual: 137, .. }));
            assert_eq!(process.io_log().history()[1].text, "before kill");
        }
    }

    #[test]
    fn interactive_input_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new().runs_for(Duration::from_millis(50));
        let process = launcher(&spawner).prepare(
            CommandSpec::new("scripted"),
            options(dir.path()).input(InputSource::Interactive),
        );

        process.write_input(b"hello\n").unwrap();
        process.close_input();
        assert_eq!(
            process.write_input(b"late").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        let completed = process.wait_completed().unwrap();
        assert_eq!(completed.input(), "hello");
    }

    #[test]
    fn registers_and_releases_shutdown_hook() {
        let dir = tempfile::tempdir().unwrap();
        let registry = leaked_registry();
        let spawner = ScriptedSpawner::new().runs_for(Duration::from_millis(50));
        let process = Launcher::with_spawner(Arc::new(spawner))
            .registry(registry)
            .prepare(CommandSpec::new("scripted"), options(dir.path()));

        process.start();
        assert_eq!(registry.len(), 1);
        process.wait_for().unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn released_hook_survives_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let registry = leaked_registry();
        let spawner = ScriptedSpawner::new().runs_for(Duration::from_secs(30));
        let process = Launcher::with_spawner(Arc::new(spawner))
            .registry(registry)
            .prepare(CommandSpec::new("scripted"), options(dir.path()));

        process.start();
        assert!(process.release_shutdown_hook());
        assert!(!process.release_shutdown_hook());
        assert_eq!(registry.run_hooks(), 0);
        assert!(process.is_alive());

        process.kill();
        assert!(process.wait_for().is_err());
    }

    #[test]
    fn rejected_hook_registration_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = leaked_registry();
        registry.run_hooks();
        let spawner = ScriptedSpawner::new().stdout("still runs\n");
        let process = Launcher::with_spawner(Arc::new(spawner))
            .registry(registry)
            .prepare(CommandSpec::new("scripted"), options(dir.path()));

        assert_eq!(process.wait_completed().unwrap().output(), "still runs");
    }
}
