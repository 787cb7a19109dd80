//! The three concurrent pumps of a running process.
//!
//! * the input feeder copies an [`InputSource`] into the child's stdin,
//! * the output and error pumps drain stdout and stderr into the [`IoLog`]
//!   and hand each reassembled line to the process's processor.
//!
//! The log always sees the raw bytes, so its line boundaries do not depend on
//! the [`ReaderMode`]. The mode only affects when the processor gets to see a
//! line. Each stream is read on a dedicated thread, which lets a pump give up
//! on a killed process whose pipe is still held open by a grandchild.
//!
//! [`IoLog`]: crate::io_log::IoLog

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::io_record::Channel;
use crate::line_buffer::LineBuffer;
use crate::managed::ManagedProcess;
use crate::pool::{self, PoolTask};
use crate::tee::TeeWriter;

/// Size of a single read from a child's pipe.
const CHUNK_SIZE: usize = 8 * 1024;

/// How often a waiting pump checks whether its process was killed.
const DISABLED_POLL: Duration = Duration::from_millis(50);

/// Default idle time before a partial line is shown to the processor.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

/// How pumps deliver lines to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    /// Deliver complete lines only (plus a final unterminated line at EOF).
    Blocking,
    /// Additionally deliver a partial line once the stream has been idle for
    /// `idle`, e.g. a prompt that never gets a newline. When that line is
    /// later completed, only the not yet delivered rest is passed on.
    NonBlocking { idle: Duration },
}

impl Default for ReaderMode {
    fn default() -> Self {
        ReaderMode::NonBlocking {
            idle: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Where the child's stdin comes from.
#[derive(Default)]
pub enum InputSource {
    /// Close stdin right away.
    #[default]
    Empty,
    /// Copy from this reader until it is exhausted, then close stdin.
    Reader(Box<dyn Read + Send>),
    /// Keep stdin open for [`ManagedProcess::write_input`].
    Interactive,
}

impl InputSource {
    #[must_use]
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        InputSource::Reader(Box::new(io::Cursor::new(data.into())))
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Empty => f.write_str("Empty"),
            InputSource::Reader(_) => f.write_str("Reader(..)"),
            InputSource::Interactive => f.write_str("Interactive"),
        }
    }
}

/// A pump that did not finish cleanly.
#[derive(Debug)]
pub struct PumpFailure {
    pub channel: Channel,
    pub error: io::Error,
}

impl fmt::Display for PumpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "An error occurred while processing {}: {}",
            self.channel.stream_label(),
            self.error
        )
    }
}

type PumpTask = PoolTask<io::Result<()>>;

/// Handles of the pumps of one process.
#[derive(Debug)]
pub(crate) struct PumpSet {
    input: Option<PumpTask>,
    output: PumpTask,
    error: PumpTask,
}

/// Streams handed to [`PumpSet::start`].
pub(crate) struct Pipes {
    pub stdin: Box<dyn Write + Send>,
    pub stdout: Box<dyn Read + Send>,
    pub stderr: Box<dyn Read + Send>,
}

impl PumpSet {
    /// Start all pumps. For interactive input the tee'd stdin is returned
    /// instead of being fed.
    pub(crate) fn start(
        process: &ManagedProcess,
        input: InputSource,
        pipes: Pipes,
        mode: ReaderMode,
    ) -> io::Result<(Self, Option<Box<dyn Write + Send>>)> {
        let Pipes {
            stdin,
            stdout,
            stderr,
        } = pipes;
        let stdin = TeeWriter::new(stdin, process.io_log(), Channel::Input);

        let (input, interactive): (Option<PumpTask>, Option<Box<dyn Write + Send>>) = match input {
            InputSource::Empty => (None, None),
            InputSource::Interactive => (None, Some(Box::new(stdin))),
            InputSource::Reader(source) => {
                let process = process.clone();
                let task = pool::spawn(move || feed_input(&process, source, stdin))?;
                (Some(task), None)
            }
        };

        let output = start_reader(process, Channel::Output, stdout, mode)?;
        let error = start_reader(process, Channel::Error, stderr, mode)?;
        Ok((
            Self {
                input,
                output,
                error,
            },
            interactive,
        ))
    }

    /// Wait for the output and error pumps, and give the input feeder at most
    /// `input_grace` to wind down.
    ///
    /// Reports the first failure in stdin, stdout, stderr order.
    pub(crate) fn join(self, input_grace: Duration) -> Result<(), PumpFailure> {
        let output = self.output.join().and_then(|r| r);
        let error = self.error.join().and_then(|r| r);
        let input = match self.input {
            None => Ok(()),
            Some(task) => match task.join_within(input_grace) {
                Some(result) => result.and_then(|r| r),
                None => {
                    debug!("Input feeder still busy after process exit, detaching it");
                    Ok(())
                }
            },
        };

        for (channel, result) in [
            (Channel::Input, input),
            (Channel::Output, output),
            (Channel::Error, error),
        ] {
            if let Err(error) = result {
                return Err(PumpFailure { channel, error });
            }
        }
        Ok(())
    }
}

fn start_reader(
    process: &ManagedProcess,
    channel: Channel,
    stream: Box<dyn Read + Send>,
    mode: ReaderMode,
) -> io::Result<PumpTask> {
    let process = process.clone();
    let idle = match mode {
        ReaderMode::Blocking => None,
        ReaderMode::NonBlocking { idle } => Some(idle),
    };
    pool::spawn(move || pump(&process, channel, stream, idle))
}

fn feed_input(
    process: &ManagedProcess,
    mut source: Box<dyn Read + Send>,
    mut stdin: TeeWriter<Box<dyn Write + Send>>,
) -> io::Result<()> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    while !process.is_disabled() {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        match stdin.write_all(&buf[..n]).and_then(|()| stdin.flush()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Process closed its stdin, stopping input feeder");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    // Dropping the writer closes the child's stdin
    Ok(())
}

fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

type Chunks = mpsc::Receiver<io::Result<Vec<u8>>>;

/// Read `stream` on a thread of its own and pass the chunks on.
///
/// The thread is not part of the pool: a pump waits on it, and it may have to
/// be abandoned while still blocked in `read`.
fn spawn_stream_reader(
    channel: Channel,
    mut stream: Box<dyn Read + Send>,
) -> io::Result<(Chunks, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(format!("shepherd-{}", channel.stream_label()))
        .spawn(move || {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match read_chunk(&mut stream, &mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        })?;
    Ok((rx, handle))
}

/// Drain `stream` into the log and hand its lines to the processor.
///
/// With `idle` set, a partial line is shown once the stream has been quiet
/// that long. A pump of a killed process stops as soon as the native exit has
/// been observed, even if a grandchild still holds the pipe open; its reader
/// thread is then detached and nothing it reads later reaches the log.
fn pump(
    process: &ManagedProcess,
    channel: Channel,
    stream: Box<dyn Read + Send>,
    idle: Option<Duration>,
) -> io::Result<()> {
    let log = process.io_log();
    let (chunks, reader) = spawn_stream_reader(channel, stream)?;
    let tick = idle.map_or(DISABLED_POLL, |idle| idle.min(DISABLED_POLL));

    let mut lines = LineBuffer::new();
    // Bytes of the current partial line already handed to the processor
    let mut shown = 0;
    let mut quiet_since = Instant::now();
    let mut reader = Some(reader);
    loop {
        match chunks.recv_timeout(tick) {
            Ok(Ok(chunk)) => {
                log.add(channel, &chunk);
                quiet_since = Instant::now();
                for line in lines.push(&chunk) {
                    deliver_rest(process, channel, &line, shown);
                    shown = 0;
                }
            }
            Ok(Err(e)) => return Err(e),
            Err(RecvTimeoutError::Timeout) => {
                if process.is_disabled() && process.exit_code().is_some() {
                    debug!(
                        stream = channel.stream_label(),
                        "Process was killed, no longer waiting for its stream to close"
                    );
                    reader = None;
                    break;
                }
                if idle.is_some_and(|idle| quiet_since.elapsed() >= idle) {
                    let prefix = lines.displayable_prefix();
                    if prefix.len() > shown {
                        process.dispatch(channel, &prefix[shown..]);
                        shown = prefix.len();
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if let Some(rest) = lines.finish() {
        deliver_rest(process, channel, &rest, shown);
    }
    match reader {
        Some(handle) => handle.join().map_err(|payload| {
            io::Error::other(format!(
                "{} reader panicked: {}",
                channel.stream_label(),
                pool::panic_message(payload.as_ref())
            ))
        }),
        None => Ok(()),
    }
}

/// Deliver the part of a completed line that was not shown yet.
fn deliver_rest(process: &ManagedProcess, channel: Channel, line: &[u8], shown: usize) {
    if shown == 0 {
        process.dispatch(channel, line);
    } else if shown < line.len() {
        process.dispatch(channel, &line[shown..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_spec::CommandSpec;
    use crate::io_record::IoRecord;
    use crate::launcher::{ExecOptions, Launcher};
    use crate::processors;
    use crate::shutdown::ShutdownRegistry;
    use crate::testing::ScriptedSpawner;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Yields each chunk after its delay.
    struct Staged(VecDeque<(Duration, &'static [u8])>);

    impl Read for Staged {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some((delay, chunk)) = self.0.pop_front() else {
                return Ok(0);
            };
            std::thread::sleep(delay);
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    fn collecting_process() -> (ManagedProcess, Arc<Mutex<Vec<IoRecord>>>) {
        let registry: &'static ShutdownRegistry = Box::leak(Box::new(ShutdownRegistry::new()));
        let (processor, lines) = processors::collecting();
        let process = Launcher::with_spawner(Arc::new(ScriptedSpawner::new()))
            .registry(registry)
            .prepare(CommandSpec::new("staged"), ExecOptions::default().processor(processor));
        (process, lines)
    }

    fn texts(lines: &Mutex<Vec<IoRecord>>) -> Vec<String> {
        lines.lock().unwrap().iter().map(|r| r.text.clone()).collect()
    }

    #[test]
    fn idle_partial_line_is_shown_then_completed() {
        let (process, lines) = collecting_process();
        let stream = Staged(VecDeque::from([
            (Duration::ZERO, &b"password: "[..]),
            (Duration::from_millis(300), &b"ok\nnext\n"[..]),
        ]));

        pump(
            &process,
            Channel::Output,
            Box::new(stream),
            Some(Duration::from_millis(50)),
        )
        .unwrap();

        assert_eq!(texts(&lines), ["password: ", "ok", "next"]);
        // The log only ever holds complete lines
        let logged: Vec<String> = process.io_log().history().into_iter().map(|r| r.text).collect();
        assert_eq!(logged, ["password: ok", "next"]);
    }

    #[test]
    fn blocking_pump_waits_for_complete_lines() {
        let (process, lines) = collecting_process();
        let stream = Staged(VecDeque::from([
            (Duration::ZERO, &b"password: "[..]),
            (Duration::from_millis(100), &b"ok\ndone"[..]),
        ]));

        pump(&process, Channel::Output, Box::new(stream), None).unwrap();

        assert_eq!(texts(&lines), ["password: ok", "done"]);
    }

    #[test]
    fn feeder_stops_quietly_on_broken_pipe() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let (process, _) = collecting_process();
        let stdin: Box<dyn Write + Send> = Box::new(Closed);
        let writer = TeeWriter::new(stdin, process.io_log(), Channel::Input);

        let fed = feed_input(&process, Box::new(io::Cursor::new(b"ignored\n".to_vec())), writer);

        assert!(fed.is_ok());
    }

    #[test]
    fn pump_failure_names_the_stream() {
        let failure = PumpFailure {
            channel: Channel::Error,
            error: io::Error::other("boom"),
        };
        assert_eq!(
            failure.to_string(),
            "An error occurred while processing stderr: boom"
        );
    }
}
